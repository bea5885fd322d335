//! Freight Triage — document decision engine for forwarding inboxes.

pub mod config;
pub mod engine;
pub mod error;
pub mod store;
