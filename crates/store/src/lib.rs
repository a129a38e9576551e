//! Local-first key-value store with sync reconciliation
//!
//! This crate is the public surface of syncstash:
//! - [`Store`] holds the database pool and the change notifier
//! - [`Partition`] scopes every operation to one user
//! - [`Subscription`] delivers coalesced snapshots of a watched key
//!
//! Local writes always win: they apply immediately, set the record PENDING,
//! and bump its version. The external sync collaborator drains
//! `pending_sync()` / `failed_sync()` and reports outcomes through
//! `acknowledge()`, which only applies when the acknowledged version is
//! still current.
//!
//! # Example
//!
//! ```no_run
//! use syncstash_database::{connect, run_migrations, DatabaseConfig};
//! use syncstash_store::Store;
//!
//! # async fn demo() -> syncstash_core::Result<()> {
//! let pool = connect(DatabaseConfig::new("app.db")).await?;
//! run_migrations(&pool).await?;
//!
//! let store = Store::new(pool);
//! let partition = store.partition("user-1")?;
//!
//! let record = partition.upsert("tasks", r#"{"items":[]}"#).await?;
//! assert_eq!(record.version, 1);
//!
//! let mut watcher = partition.watch("tasks").await?;
//! let snapshot = watcher.next().await;
//! # let _ = snapshot;
//! # Ok(())
//! # }
//! ```

mod notifier;
mod store;

pub use notifier::{ChangeNotifier, Invalidation, Subscription};
pub use store::{Partition, Store};

// Re-export the domain types callers interact with
pub use syncstash_core::{AckOutcome, Record, StoreError, SyncStatus, Timestamp};
