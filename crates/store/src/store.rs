//! Store handle and user partitions

use tokio::sync::mpsc;

use syncstash_core::{AckOutcome, Record, StoreError, SyncStatus, Timestamp};
use syncstash_database::queries::records;
use syncstash_database::DbPool;

use crate::notifier::{spawn_refresh_worker, ChangeNotifier, Invalidation, Subscription};

/// Handle over the local record store
///
/// Holds the connection pool and the change notifier; all scoped access
/// goes through [`Store::partition`]. Must be created inside a Tokio
/// runtime (it spawns the subscription refresh worker).
pub struct Store {
    pool: DbPool,
    notifier: ChangeNotifier,
    invalidations: mpsc::UnboundedSender<Invalidation>,
}

impl Store {
    /// Creates a store over an already-migrated pool
    pub fn new(pool: DbPool) -> Self {
        let notifier = ChangeNotifier::new();
        let invalidations = spawn_refresh_worker(pool.clone(), notifier.clone());
        Self {
            pool,
            notifier,
            invalidations,
        }
    }

    /// Returns the underlying pool (maintenance pragmas, direct queries)
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Opens a user partition; every operation on it is scoped to `user_id`
    ///
    /// Rejects a blank user id before any transaction is opened.
    pub fn partition(&self, user_id: impl Into<String>) -> Result<Partition, StoreError> {
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(StoreError::InvalidPartition {
                reason: "user id must not be blank".to_string(),
            });
        }
        Ok(Partition {
            pool: self.pool.clone(),
            notifier: self.notifier.clone(),
            invalidations: self.invalidations.clone(),
            user_id,
        })
    }

    /// Removes every record of every user
    ///
    /// Deliberately unscoped; reserved for full local wipe / logout flows.
    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let removed = records::delete_all(&self.pool).await?;
        log::info!("wiped local store ({} records)", removed);
        let _ = self.invalidations.send(Invalidation::All);
        Ok(removed)
    }
}

/// All record operations for a single user partition
///
/// Local writes always win: they apply immediately, force PENDING, and bump
/// the version. Remote outcomes come back through [`Partition::acknowledge`]
/// and only apply when the acknowledged version is still current.
#[derive(Clone)]
pub struct Partition {
    pool: DbPool,
    notifier: ChangeNotifier,
    invalidations: mpsc::UnboundedSender<Invalidation>,
    user_id: String,
}

impl Partition {
    /// The user this partition is scoped to
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Inserts or fully replaces the record for `key`
    pub async fn upsert(&self, key: &str, value: impl Into<String>) -> Result<Record, StoreError> {
        let record =
            records::upsert(&self.pool, key, &self.user_id, &value.into(), Timestamp::now())
                .await?;
        self.invalidate(key);
        Ok(record)
    }

    /// Replaces an existing record, failing with `NotFound` if absent
    pub async fn update(&self, key: &str, value: impl Into<String>) -> Result<Record, StoreError> {
        let record =
            records::update(&self.pool, key, &self.user_id, &value.into(), Timestamp::now())
                .await?;
        self.invalidate(key);
        Ok(record)
    }

    /// Removes the record for `key`; returns rows removed (0 is success)
    pub async fn delete(&self, key: &str) -> Result<u64, StoreError> {
        let removed = records::delete_by_key(&self.pool, key, &self.user_id).await?;
        if removed > 0 {
            self.invalidate(key);
        }
        Ok(removed)
    }

    /// Removes every record in this partition
    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let removed = records::delete_all_by_user(&self.pool, &self.user_id).await?;
        log::info!(
            "cleared partition for user '{}' ({} records)",
            self.user_id,
            removed
        );
        let _ = self.invalidations.send(Invalidation::User {
            user_id: self.user_id.clone(),
        });
        Ok(removed)
    }

    /// Applies a sync outcome for the given acknowledged version
    ///
    /// Returns `Stale` (and leaves the record untouched) when the record
    /// has been edited or deleted since version `version` was transmitted.
    pub async fn acknowledge(
        &self,
        key: &str,
        version: i64,
        status: SyncStatus,
    ) -> Result<AckOutcome, StoreError> {
        let outcome =
            records::update_sync_status(&self.pool, key, &self.user_id, status, version).await?;
        match outcome {
            AckOutcome::Applied => self.invalidate(key),
            AckOutcome::Stale => {
                log::debug!(
                    "discarding stale acknowledgement for key '{}' (version {})",
                    key,
                    version
                );
            }
        }
        Ok(outcome)
    }

    /// Stamps a sync attempt time without claiming a value change
    pub async fn touch(&self, key: &str, timestamp: Timestamp) -> Result<(), StoreError> {
        records::update_timestamp(&self.pool, key, &self.user_id, timestamp).await?;
        self.invalidate(key);
        Ok(())
    }

    /// Fetches one record; `None` if absent
    pub async fn get(&self, key: &str) -> Result<Option<Record>, StoreError> {
        records::get_by_key(&self.pool, key, &self.user_id).await
    }

    /// All records in this partition, newest mutation first
    pub async fn all(&self) -> Result<Vec<Record>, StoreError> {
        records::get_all_by_user(&self.pool, &self.user_id).await
    }

    /// Records awaiting sync, oldest first
    pub async fn pending_sync(&self) -> Result<Vec<Record>, StoreError> {
        records::get_pending_sync(&self.pool, &self.user_id).await
    }

    /// Records whose last sync attempt failed, oldest first
    pub async fn failed_sync(&self) -> Result<Vec<Record>, StoreError> {
        records::get_failed_sync(&self.pool, &self.user_id).await
    }

    /// Number of records in this partition
    pub async fn count(&self) -> Result<i64, StoreError> {
        records::get_count(&self.pool, &self.user_id).await
    }

    /// Number of records awaiting sync
    pub async fn pending_sync_count(&self) -> Result<i64, StoreError> {
        records::get_pending_sync_count(&self.pool, &self.user_id).await
    }

    /// Watches `key`: an initial snapshot, then the latest state after
    /// every committed mutation touching it
    pub async fn watch(&self, key: &str) -> Result<Subscription, StoreError> {
        let initial = records::get_by_key(&self.pool, key, &self.user_id).await?;
        Ok(self.notifier.subscribe(&self.user_id, key, initial))
    }

    fn invalidate(&self, key: &str) {
        let _ = self.invalidations.send(Invalidation::Key {
            user_id: self.user_id.clone(),
            key: key.to_string(),
        });
    }
}
