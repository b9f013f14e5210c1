//! Postgres `LISTEN` bridge.
//!
//! [`ChangeFeedListener`] holds one long-lived connection listening on the
//! change channel. Each notification payload is a `notification_log` id;
//! the listener checks that the entry exists and forwards the id string to
//! the [`BroadcastHub`]. When the connection drops it retries with
//! exponential backoff until [`ChangeFeedListener::disconnect`] is called.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gridsync_core::backoff::{Backoff, ReconnectConfig};
use gridsync_core::types::DbId;
use gridsync_db::repositories::NotificationLogRepo;
use sqlx::postgres::{PgConnectOptions, PgListener};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::hub::BroadcastHub;

/// Channel the change-log trigger notifies on.
pub const DEFAULT_CHANNEL: &str = gridsync_db::NOTIFY_CHANNEL;

/// How long `disconnect` waits for the receive task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Connection settings for the listener.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Pooled application URL, used when no direct URL is set.
    pub database_url: Option<String>,
    /// Direct (non-pooled) URL; preferred for long-lived `LISTEN`.
    pub direct_database_url: Option<String>,
    pub channel: String,
    pub reconnect: ReconnectConfig,
}

impl ListenerConfig {
    pub fn new(database_url: Option<String>, direct_database_url: Option<String>) -> Self {
        Self {
            database_url,
            direct_database_url,
            channel: DEFAULT_CHANNEL.to_string(),
            reconnect: ReconnectConfig::change_feed(),
        }
    }

    /// URL to listen on: the direct URL when set, else the pooled one.
    pub fn connection_url(&self) -> Result<&str, ListenerError> {
        self.direct_database_url
            .as_deref()
            .or(self.database_url.as_deref())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| {
                ListenerError::Config("No DATABASE_URL or DIRECT_DATABASE_URL configured".into())
            })
    }

    /// True when only a pooled-looking URL is available. Connection
    /// poolers do not reliably deliver notifications to idle sessions.
    pub fn looks_pooled(&self) -> bool {
        if self.direct_database_url.is_some() {
            return false;
        }
        self.database_url
            .as_deref()
            .map(str::to_lowercase)
            .is_some_and(|url| url.contains("pooler") || url.contains("neon"))
    }
}

/// Errors raised while establishing the listen connection.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("Listener configuration error: {0}")]
    Config(String),

    #[error("Listener database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Parse a notification payload into a change-log id.
///
/// Returns `None` for non-numeric payloads and for zero.
pub fn parse_change_id(payload: &str) -> Option<DbId> {
    match payload.trim().parse::<DbId>() {
        Ok(0) => None,
        Ok(id) => Some(id),
        Err(_) => None,
    }
}

/// State shared between the listener handle and its receive task.
struct ListenerShared {
    config: ListenerConfig,
    pool: PgPool,
    hub: Arc<BroadcastHub>,
    connected: AtomicBool,
}

struct ListenerTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Long-lived change-feed subscription.
///
/// Constructed once at startup and shared as `Arc<ChangeFeedListener>`.
pub struct ChangeFeedListener {
    shared: Arc<ListenerShared>,
    task: Mutex<Option<ListenerTask>>,
}

impl ChangeFeedListener {
    pub fn new(config: ListenerConfig, pool: PgPool, hub: Arc<BroadcastHub>) -> Self {
        Self {
            shared: Arc::new(ListenerShared {
                config,
                pool,
                hub,
                connected: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Open the listen connection and start the receive task.
    ///
    /// Calling this while a receive task is running (connected or
    /// reconnecting) is a no-op.
    pub async fn connect(&self) -> Result<(), ListenerError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Ok(());
        }

        let url = self.shared.config.connection_url()?.to_string();
        if self.shared.config.looks_pooled() {
            tracing::warn!(
                "DATABASE_URL looks like a pooled endpoint; LISTEN/NOTIFY may not be delivered. \
                 Set DIRECT_DATABASE_URL to a direct connection"
            );
        }
        if let Ok(options) = PgConnectOptions::from_str(&url) {
            tracing::debug!(host = options.get_host(), "Connecting change-feed listener");
        }

        let listener = match open_listener(&url, &self.shared.config.channel).await {
            Ok(listener) => listener,
            Err(e) => {
                self.shared.connected.store(false, Ordering::SeqCst);
                tracing::error!(error = %e, "Failed to start change-feed listener");
                return Err(e.into());
            }
        };

        self.shared.connected.store(true, Ordering::SeqCst);
        tracing::info!(channel = %self.shared.config.channel, "Change-feed listener connected");

        let cancel = CancellationToken::new();
        let shared = Arc::clone(&self.shared);
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run_listen_loop(shared, listener, url, task_cancel).await;
        });

        *task = Some(ListenerTask { cancel, handle });
        Ok(())
    }

    /// Run [`connect`](Self::connect) on a background task unless already
    /// connected. Failures are logged.
    pub fn spawn_connect(self: &Arc<Self>) {
        if self.is_connected() {
            return;
        }
        let listener = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = listener.connect().await {
                tracing::warn!(error = %e, "Change feed unavailable, push streams carry heartbeats only");
            }
        });
    }

    /// Stop the receive task and close the connection.
    pub async fn disconnect(&self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };
        task.cancel.cancel();
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, task.handle).await;
        self.shared.connected.store(false, Ordering::SeqCst);
        tracing::info!("Change-feed listener disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Resolve one raw notification payload and broadcast it.
    pub async fn handle_payload(&self, payload: &str) {
        self.shared.handle_payload(payload).await;
    }
}

impl ListenerShared {
    async fn handle_payload(&self, payload: &str) {
        let Some(id) = parse_change_id(payload) else {
            tracing::warn!(payload, "Ignoring invalid change id");
            return;
        };

        match NotificationLogRepo::exists(&self.pool, id).await {
            Ok(true) => {
                let delivered = self.hub.broadcast(&id.to_string()).await;
                tracing::debug!(log_id = id, delivered, "Change broadcast");
            }
            Ok(false) => {
                tracing::warn!(log_id = id, "Change log entry not found");
            }
            Err(e) => {
                tracing::error!(log_id = id, error = %e, "Failed to resolve change log entry");
            }
        }
    }
}

async fn open_listener(url: &str, channel: &str) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect(url).await?;
    listener.listen(channel).await?;
    Ok(listener)
}

/// Receive loop: forward notifications; on error, reconnect with backoff.
///
/// Runs until `cancel` is triggered.
async fn run_listen_loop(
    shared: Arc<ListenerShared>,
    mut listener: PgListener,
    url: String,
    cancel: CancellationToken,
) {
    let mut backoff = Backoff::new(shared.config.reconnect.clone());

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = listener.recv() => match received {
                Ok(notification) => shared.handle_payload(notification.payload()).await,
                Err(e) => {
                    shared.connected.store(false, Ordering::SeqCst);
                    tracing::error!(error = %e, "Change-feed connection lost");

                    match reconnect(&url, &shared.config.channel, &mut backoff, &cancel).await {
                        Some(reopened) => {
                            listener = reopened;
                            backoff.reset();
                            shared.connected.store(true, Ordering::SeqCst);
                            tracing::info!("Change-feed listener reconnected");
                        }
                        None => break,
                    }
                }
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    tracing::info!("Change-feed receive loop exited");
}

/// Retry until a listen connection opens. `None` when cancelled.
async fn reconnect(
    url: &str,
    channel: &str,
    backoff: &mut Backoff,
    cancel: &CancellationToken,
) -> Option<PgListener> {
    loop {
        let delay = backoff.next_delay();
        tracing::info!(
            attempt = backoff.attempt(),
            delay_ms = delay.as_millis() as u64,
            "Reconnecting change-feed listener",
        );

        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        tokio::select! {
            _ = cancel.cancelled() => return None,
            result = open_listener(url, channel) => match result {
                Ok(listener) => return Some(listener),
                Err(e) => {
                    tracing::warn!(error = %e, "Reconnect attempt {} failed", backoff.attempt());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_change_id_accepts_positive_integers() {
        assert_eq!(parse_change_id("42"), Some(42));
        assert_eq!(parse_change_id(" 7\n"), Some(7));
        assert_eq!(parse_change_id("9007199254740993"), Some(9_007_199_254_740_993));
    }

    #[test]
    fn parse_change_id_drops_zero_and_garbage() {
        assert_eq!(parse_change_id("0"), None);
        assert_eq!(parse_change_id(""), None);
        assert_eq!(parse_change_id("abc"), None);
        assert_eq!(parse_change_id("{\"id\":1}"), None);
    }

    #[test]
    fn direct_url_is_preferred() {
        let config = ListenerConfig::new(
            Some("postgres://pooler.example/db".into()),
            Some("postgres://direct.example/db".into()),
        );
        assert_eq!(config.connection_url().unwrap(), "postgres://direct.example/db");
        assert!(!config.looks_pooled());
    }

    #[test]
    fn pooled_url_without_direct_is_flagged() {
        let config = ListenerConfig::new(Some("postgres://u@ep-x-POOLER.neon.tech/db".into()), None);
        assert!(config.looks_pooled());

        let plain = ListenerConfig::new(Some("postgres://localhost/db".into()), None);
        assert!(!plain.looks_pooled());
    }

    #[test]
    fn missing_url_is_a_config_error() {
        let config = ListenerConfig::new(None, None);
        assert_matches!(config.connection_url(), Err(ListenerError::Config(_)));
    }

    #[test]
    fn default_channel_and_backoff() {
        let config = ListenerConfig::new(None, None);
        assert_eq!(config.channel, DEFAULT_CHANNEL);
        assert_eq!(config.reconnect.initial_delay, Duration::from_secs(5));
    }
}
