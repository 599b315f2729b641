//! Principal model

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role names recognized by the gateway's routes
pub mod roles {
    pub const ADMIN: &str = "admin";
    pub const USER: &str = "user";

    /// Roles that satisfy the "any recognized role" check
    pub const RECOGNIZED: [&str; 2] = [ADMIN, USER];
}

/// Identity resolved from a bearer token, valid for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub roles: BTreeSet<String>,
    pub expires_at: DateTime<Utc>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// True when the principal holds at least one of `candidates`
    pub fn has_any_role<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates.into_iter().any(|role| self.has_role(role))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Name used in log lines
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.sub)
    }
}
