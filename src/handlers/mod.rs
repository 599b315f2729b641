//! HTTP handlers

pub mod auth;
pub mod health;
pub mod predict;
pub mod protected;
pub mod root;
