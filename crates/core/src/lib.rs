//! Core domain types for syncstash
//!
//! This crate defines the record model, sync-status state machine values,
//! and the error taxonomy shared by the database and store layers.

pub mod error;
pub mod types;

// Re-export commonly used types
pub use error::{Result, StoreError};
pub use types::{AckOutcome, Record, SyncStatus, Timestamp};
