//! Record store operations
//!
//! Every mutation here is a single SQL statement, which SQLite runs as one
//! implicit transaction: it commits fully or not at all. The version/status
//! policy lives in the write SQL itself so a local write can never observe
//! or produce a half-applied state:
//!
//! - value-changing writes (`upsert`, `update`) force `sync_status` to
//!   PENDING and bump `version` (1 for a new row);
//! - `update_sync_status` is a conditional check-and-set on `version`, so a
//!   stale acknowledgement cannot interleave with a newer local write;
//! - `update_timestamp` touches neither `version` nor `sync_status`.

use crate::DbPool;
use syncstash_core::{AckOutcome, Record, StoreError, SyncStatus, Timestamp};

/// Inserts or fully replaces the row for `key`
///
/// New rows get version 1; replaced rows get their version bumped. Either
/// way the row comes back PENDING. Returns the stored record.
pub async fn upsert(
    pool: &DbPool,
    key: &str,
    user_id: &str,
    value: &str,
    timestamp: Timestamp,
) -> Result<Record, StoreError> {
    let row = sqlx::query(
        r#"
        INSERT INTO key_value_store (key, value, user_id, timestamp, sync_status, version)
        VALUES (?, ?, ?, ?, 'PENDING', 1)
        ON CONFLICT(key) DO UPDATE SET
            value = excluded.value,
            user_id = excluded.user_id,
            timestamp = excluded.timestamp,
            sync_status = 'PENDING',
            version = key_value_store.version + 1
        RETURNING key, value, user_id, timestamp, sync_status, version
        "#,
    )
    .bind(key)
    .bind(value)
    .bind(user_id)
    .bind(timestamp.as_millis())
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to upsert record", e))?;

    row_to_record(row)
}

/// Replaces an existing row, failing with `NotFound` if none matches
///
/// Same version/status policy as `upsert`; the only difference is that a
/// missing row is an explicit miss instead of an insert.
pub async fn update(
    pool: &DbPool,
    key: &str,
    user_id: &str,
    value: &str,
    timestamp: Timestamp,
) -> Result<Record, StoreError> {
    let row = sqlx::query(
        r#"
        UPDATE key_value_store
        SET value = ?, timestamp = ?, sync_status = 'PENDING', version = version + 1
        WHERE key = ? AND user_id = ?
        RETURNING key, value, user_id, timestamp, sync_status, version
        "#,
    )
    .bind(value)
    .bind(timestamp.as_millis())
    .bind(key)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to update record", e))?
    .ok_or_else(|| StoreError::not_found(key, user_id))?;

    row_to_record(row)
}

/// Applies a remote sync acknowledgement for `version`
///
/// The status is written only if the stored version still equals the
/// acknowledged one; otherwise nothing changes and `Stale` is returned.
/// A row deleted since the acknowledgement was issued also reports `Stale`:
/// in both cases the acknowledged state no longer exists.
pub async fn update_sync_status(
    pool: &DbPool,
    key: &str,
    user_id: &str,
    status: SyncStatus,
    version: i64,
) -> Result<AckOutcome, StoreError> {
    let result = sqlx::query(
        "UPDATE key_value_store SET sync_status = ? WHERE key = ? AND user_id = ? AND version = ?",
    )
    .bind(status.as_str())
    .bind(key)
    .bind(user_id)
    .bind(version)
    .execute(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to update sync status", e))?;

    if result.rows_affected() == 1 {
        Ok(AckOutcome::Applied)
    } else {
        Ok(AckOutcome::Stale)
    }
}

/// Stamps a sync attempt time without claiming a value change
///
/// Touches neither `version` nor `sync_status`. A missing row is a silent
/// no-op.
pub async fn update_timestamp(
    pool: &DbPool,
    key: &str,
    user_id: &str,
    timestamp: Timestamp,
) -> Result<(), StoreError> {
    sqlx::query("UPDATE key_value_store SET timestamp = ? WHERE key = ? AND user_id = ?")
        .bind(timestamp.as_millis())
        .bind(key)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::storage("Failed to update timestamp", e))?;

    Ok(())
}

/// Removes the row matching a record's identity; zero matched rows is success
pub async fn delete(pool: &DbPool, record: &Record) -> Result<u64, StoreError> {
    delete_by_key(pool, &record.key, &record.user_id).await
}

/// Removes at most one row; zero matched rows is success
pub async fn delete_by_key(pool: &DbPool, key: &str, user_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM key_value_store WHERE key = ? AND user_id = ?")
        .bind(key)
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::storage("Failed to delete record", e))?;

    Ok(result.rows_affected())
}

/// Removes every row belonging to one user (logout)
pub async fn delete_all_by_user(pool: &DbPool, user_id: &str) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM key_value_store WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await
        .map_err(|e| StoreError::storage("Failed to delete user records", e))?;

    Ok(result.rows_affected())
}

/// Removes every row (full local wipe)
pub async fn delete_all(pool: &DbPool) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM key_value_store")
        .execute(pool)
        .await
        .map_err(|e| StoreError::storage("Failed to delete all records", e))?;

    Ok(result.rows_affected())
}

/// Fetches one record; absence is not an error
pub async fn get_by_key(
    pool: &DbPool,
    key: &str,
    user_id: &str,
) -> Result<Option<Record>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT key, value, user_id, timestamp, sync_status, version
        FROM key_value_store
        WHERE key = ? AND user_id = ?
        LIMIT 1
        "#,
    )
    .bind(key)
    .bind(user_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to fetch record", e))?;

    row.map(row_to_record).transpose()
}

/// Fetches all records for a user, newest mutation first
pub async fn get_all_by_user(pool: &DbPool, user_id: &str) -> Result<Vec<Record>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT key, value, user_id, timestamp, sync_status, version
        FROM key_value_store
        WHERE user_id = ?
        ORDER BY timestamp DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to fetch user records", e))?;

    rows.into_iter().map(row_to_record).collect()
}

/// Fetches records awaiting sync, oldest first
pub async fn get_pending_sync(pool: &DbPool, user_id: &str) -> Result<Vec<Record>, StoreError> {
    get_by_status(pool, user_id, SyncStatus::Pending).await
}

/// Fetches records whose last sync attempt failed, oldest first
pub async fn get_failed_sync(pool: &DbPool, user_id: &str) -> Result<Vec<Record>, StoreError> {
    get_by_status(pool, user_id, SyncStatus::Failed).await
}

async fn get_by_status(
    pool: &DbPool,
    user_id: &str,
    status: SyncStatus,
) -> Result<Vec<Record>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT key, value, user_id, timestamp, sync_status, version
        FROM key_value_store
        WHERE user_id = ? AND sync_status = ?
        ORDER BY timestamp ASC
        "#,
    )
    .bind(user_id)
    .bind(status.as_str())
    .fetch_all(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to fetch records by status", e))?;

    rows.into_iter().map(row_to_record).collect()
}

/// Counts all records for a user
pub async fn get_count(pool: &DbPool, user_id: &str) -> Result<i64, StoreError> {
    sqlx::query_scalar("SELECT COUNT(*) FROM key_value_store WHERE user_id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .map_err(|e| StoreError::storage("Failed to count records", e))
}

/// Counts records awaiting sync for a user
pub async fn get_pending_sync_count(pool: &DbPool, user_id: &str) -> Result<i64, StoreError> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM key_value_store WHERE user_id = ? AND sync_status = 'PENDING'",
    )
    .bind(user_id)
    .fetch_one(pool)
    .await
    .map_err(|e| StoreError::storage("Failed to count pending records", e))
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<Record, StoreError> {
    use sqlx::Row;

    let key: String = row
        .try_get("key")
        .map_err(|e| StoreError::storage("Missing key", e))?;
    let value: String = row
        .try_get("value")
        .map_err(|e| StoreError::storage("Missing value", e))?;
    let user_id: String = row
        .try_get("user_id")
        .map_err(|e| StoreError::storage("Missing user id", e))?;
    let timestamp_ms: i64 = row
        .try_get("timestamp")
        .map_err(|e| StoreError::storage("Missing timestamp", e))?;
    let status_text: String = row
        .try_get("sync_status")
        .map_err(|e| StoreError::storage("Missing sync status", e))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::storage("Missing version", e))?;

    Ok(Record {
        key,
        value,
        user_id,
        timestamp: Timestamp::from_millis(timestamp_ms),
        sync_status: status_text.parse()?,
        version,
    })
}
