//! Sync status state machine values and acknowledgement outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

/// Synchronization state of a record against the remote service
///
/// Every local value-changing write forces `Pending`; the external sync
/// collaborator reports `Synced` or `Failed` afterwards. No transition is
/// disallowed, because remote outcomes are asynchronous and may arrive
/// after further local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncStatus {
    /// Locally changed, not yet confirmed remotely
    Pending,
    /// Confirmed matching remote
    Synced,
    /// Last sync attempt rejected or errored
    Failed,
}

impl SyncStatus {
    /// Returns the persisted text form (matches the on-disk schema)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Synced => "SYNCED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SYNCED" => Ok(Self::Synced),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus {
                value: other.to_string(),
            }),
        }
    }
}

/// Result of applying a remote sync acknowledgement
///
/// An acknowledgement carries the version it confirms. If the record has
/// been edited (or deleted) since, the acknowledgement is stale and is
/// discarded without mutating the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The acknowledged version matched and the status was updated
    Applied,
    /// The acknowledged version no longer matches; nothing changed
    Stale,
}

impl AckOutcome {
    /// Returns true if the acknowledgement was applied
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}
