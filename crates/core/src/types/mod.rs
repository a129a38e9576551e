//! Domain types for syncstash
//!
//! - `record`: the versioned key-value record
//! - `sync`: sync status values and acknowledgement outcomes
//! - `common`: shared time utilities

mod common;
mod record;
mod sync;

// Re-export all public types
pub use common::Timestamp;
pub use record::Record;
pub use sync::{AckOutcome, SyncStatus};
