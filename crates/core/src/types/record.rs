//! The versioned key-value record

use serde::{Deserialize, Serialize};

use super::common::Timestamp;
use super::sync::SyncStatus;

/// A single versioned record in a user partition
///
/// The physical primary key is `key` alone; the composite (`user_id`, `key`)
/// is the logical identity, enforced by every query filtering on `user_id`.
/// `version` starts at 1 on the first write and is bumped by every
/// value-changing write; it never decreases while the record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Identifies the logical item within the user partition
    pub key: String,
    /// Opaque payload; encoding is the caller's concern
    pub value: String,
    /// Partition identifier
    pub user_id: String,
    /// Last local mutation time
    pub timestamp: Timestamp,
    /// Synchronization state against the remote service
    pub sync_status: SyncStatus,
    /// Per-key monotonic counter used to detect stale acknowledgements
    pub version: i64,
}

impl Record {
    /// Creates an unstored record
    ///
    /// `version` is 0 here; the store assigns 1 on the first write.
    pub fn new(
        key: impl Into<String>,
        value: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            user_id: user_id.into(),
            timestamp: Timestamp::now(),
            sync_status: SyncStatus::Pending,
            version: 0,
        }
    }

    /// Returns true if the record is awaiting sync
    pub fn is_pending(&self) -> bool {
        self.sync_status == SyncStatus::Pending
    }

    /// Returns true if the record failed its last sync attempt
    pub fn is_failed(&self) -> bool {
        self.sync_status == SyncStatus::Failed
    }
}
