//! Covenant - consent aggregate store and amendment-history engine
//!
//! This library provides the consent core for open-banking style data
//! sharing: the versioned consent aggregate, its status state machine,
//! point-in-time amendment history, scheduled expiry enforcement and
//! deduplicated lifecycle event publication. Gateway, identity and admin
//! collaborators consume it directly; it produces no wire-level responses.

pub mod entities;
pub mod errors;
pub mod history;
pub mod jobs;
pub mod publisher;
pub mod search;
pub mod service;
pub mod settings;
pub mod state_machine;
pub mod storage;
