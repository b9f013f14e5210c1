//! Periodic cleanup of old change-log entries.
//!
//! Deletes `notification_log` rows older than the retention window on a
//! fixed interval using `tokio::time::interval`.

use std::time::Duration;

use chrono::Utc;
use gridsync_db::repositories::NotificationLogRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// How often the cleanup job runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(3600);

/// Delete entries older than `retention_days` once.
///
/// Returns the number of rows removed.
pub async fn purge_once(pool: &PgPool, retention_days: i64) -> Result<u64, sqlx::Error> {
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);
    NotificationLogRepo::delete_older_than(pool, cutoff).await
}

/// Run the retention loop until `cancel` is triggered.
pub async fn run(pool: PgPool, retention_days: i64, cancel: CancellationToken) {
    tracing::info!(
        retention_days,
        interval_secs = CLEANUP_INTERVAL.as_secs(),
        "Notification retention job started"
    );

    let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Notification retention job stopping");
                break;
            }
            _ = interval.tick() => {
                match purge_once(&pool, retention_days).await {
                    Ok(deleted) if deleted > 0 => {
                        tracing::info!(deleted, "Notification retention: purged old rows");
                    }
                    Ok(_) => tracing::debug!("Notification retention: no rows to purge"),
                    Err(e) => {
                        tracing::error!(error = %e, "Notification retention: cleanup failed");
                    }
                }
            }
        }
    }
}
