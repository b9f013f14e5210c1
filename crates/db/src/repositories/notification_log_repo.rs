//! Repository for the `notification_log` table.

use gridsync_core::notification::ChangeAction;
use gridsync_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::notification_log::NotificationLog;

/// Column list for `notification_log` queries.
const COLUMNS: &str = "id, table_name, action, payload, created_at";

/// Provides read and retention operations for change log entries.
pub struct NotificationLogRepo;

impl NotificationLogRepo {
    /// Find a log entry by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<NotificationLog>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM notification_log WHERE id = $1");
        sqlx::query_as::<_, NotificationLog>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Check whether a log entry exists without loading its payload.
    pub async fn exists(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notification_log WHERE id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await
    }

    /// List the newest entries, optionally filtered by table and action.
    pub async fn list_recent(
        pool: &PgPool,
        table_name: Option<&str>,
        action: Option<ChangeAction>,
        limit: i64,
    ) -> Result<Vec<NotificationLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM notification_log \
             WHERE ($1::text IS NULL OR table_name = $1) \
               AND ($2::text IS NULL OR action = $2) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3"
        );
        sqlx::query_as::<_, NotificationLog>(&query)
            .bind(table_name)
            .bind(action.map(ChangeAction::as_str))
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Delete entries created before `cutoff`. Returns the number removed.
    pub async fn delete_older_than(pool: &PgPool, cutoff: Timestamp) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM notification_log WHERE created_at < $1")
            .bind(cutoff)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }
}
