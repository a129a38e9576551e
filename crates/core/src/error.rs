//! Error types for syncstash
//!
//! The taxonomy is deliberately small:
//! - `NotFound`: a targeted update addressed a row that does not exist.
//! - `Storage`: the substrate failed; the write may not have persisted, so
//!   this is always surfaced to the caller.
//! - `InvalidPartition`: an operation was missing a usable user id and was
//!   rejected before any transaction opened.
//! - `InvalidStatus`: a sync status read back from disk was not one of the
//!   three known states.
//!
//! A stale acknowledgement is not an error; see `types::AckOutcome`.

use thiserror::Error;

/// Main error type for store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Targeted update or replace found no matching row
    #[error("Record not found: key '{key}' for user '{user_id}'")]
    NotFound { key: String, user_id: String },

    /// I/O or transaction failure from the storage substrate
    #[error("Storage failure: {message}")]
    Storage {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation missing required user scoping
    #[error("Invalid partition: {reason}")]
    InvalidPartition { reason: String },

    /// Persisted sync status text did not match a known state
    #[error("Invalid sync status: '{value}'")]
    InvalidStatus { value: String },
}

impl StoreError {
    /// Helper to create a storage failure from any error type
    pub fn storage<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Helper for a not-found miss on a (key, user) pair
    pub fn not_found(key: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self::NotFound {
            key: key.into(),
            user_id: user_id.into(),
        }
    }

    /// Returns true if this error means the write may not have persisted
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}

/// Convenience type alias for Results using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_not_found_display() {
        let err = StoreError::not_found("settings", "u1");
        let display = format!("{}", err);
        assert!(display.contains("settings"));
        assert!(display.contains("u1"));
    }

    #[test]
    fn test_storage_helper_preserves_source() {
        let inner = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = StoreError::storage("Failed to commit", inner);

        assert!(matches!(err, StoreError::Storage { .. }));
        assert!(err.source().is_some());
        assert!(err.is_storage_failure());
    }

    #[test]
    fn test_invalid_partition_display() {
        let err = StoreError::InvalidPartition {
            reason: "user id must not be blank".to_string(),
        };
        assert!(err.to_string().contains("Invalid partition"));
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn test_invalid_status_display() {
        let err = StoreError::InvalidStatus {
            value: "SYNCING".to_string(),
        };
        assert!(err.to_string().contains("SYNCING"));
    }

    #[test]
    fn test_result_type_alias() {
        fn test_function() -> Result<i32> {
            Ok(42)
        }

        assert_eq!(test_function().unwrap(), 42);
    }
}
