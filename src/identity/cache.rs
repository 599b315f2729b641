//! Bounded cache of recently validated tokens

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use crate::models::Principal;

struct Entry {
    principal: Principal,
    expires_at: DateTime<Utc>,
}

/// Keyed by the SHA-256 of the token so raw tokens never sit in memory
/// longer than the request that carried them. Every read compares the
/// entry's expiry with the wall clock.
pub struct TokenCache {
    entries: RwLock<HashMap<String, Entry>>,
    capacity: usize,
    ttl: chrono::Duration,
}

impl TokenCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity,
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    pub fn get(&self, token: &str) -> Option<Principal> {
        self.get_at(token, Utc::now())
    }

    pub fn insert(&self, token: &str, principal: Principal) {
        self.insert_at(token, principal, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_at(&self, token: &str, now: DateTime<Utc>) -> Option<Principal> {
        let key = hash_token(token);
        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if entry.expires_at > now => return Some(entry.principal.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless another request refreshed it meanwhile.
        let mut entries = self.entries.write();
        if entries.get(&key).is_some_and(|entry| entry.expires_at <= now) {
            entries.remove(&key);
        }
        None
    }

    fn insert_at(&self, token: &str, principal: Principal, now: DateTime<Utc>) {
        let expires_at = principal.expires_at.min(now + self.ttl);
        if expires_at <= now || self.capacity == 0 {
            return;
        }

        let key = hash_token(token);
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            entries.retain(|_, entry| entry.expires_at > now);
        }
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let soonest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(victim) = soonest {
                entries.remove(&victim);
            }
        }
        entries.insert(key, Entry { principal, expires_at });
    }
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
