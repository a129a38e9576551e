//! syncstash Database Layer
//!
//! This crate provides the durable record store for syncstash. It uses
//! SQLite with sqlx, and carries the version/sync-status write policy in
//! the SQL itself (see `queries::records`).

pub mod connection;
pub mod migrations;
pub mod queries;

pub use connection::{close, connect, database_exists, DatabaseConfig, DbPool};
pub use migrations::{current_version, optimize, run_migrations, verify_integrity};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::records;
    use connection::create_test_db;
    use syncstash_core::{SyncStatus, Timestamp};

    #[tokio::test]
    async fn test_database_migrations() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_migrations")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert!(count > 0);
    }

    #[tokio::test]
    async fn test_full_record_workflow() {
        let pool = create_test_db().await.unwrap();
        run_migrations(&pool).await.unwrap();

        let record = records::upsert(&pool, "tasks", "u1", r#"{"items":[]}"#, Timestamp::now())
            .await
            .unwrap();
        assert_eq!(record.version, 1);
        assert_eq!(record.sync_status, SyncStatus::Pending);

        let pending = records::get_pending_sync(&pool, "u1").await.unwrap();
        assert_eq!(pending.len(), 1);

        let outcome = records::update_sync_status(&pool, "tasks", "u1", SyncStatus::Synced, 1)
            .await
            .unwrap();
        assert!(outcome.is_applied());

        let retrieved = records::get_by_key(&pool, "tasks", "u1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved.sync_status, SyncStatus::Synced);
        assert!(records::get_pending_sync(&pool, "u1").await.unwrap().is_empty());
    }
}
