use gridsync_core::page::DEFAULT_PAGE_SIZE;
use gridsync_events::listener::ListenerConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Pooled database URL.
    pub database_url: Option<String>,
    /// Direct database URL for the long-lived `LISTEN` connection.
    pub direct_database_url: Option<String>,
    /// Interval between push-stream heartbeat comments, in seconds.
    pub sse_heartbeat_secs: u64,
    /// Default rows per page for `GET /api/table`.
    pub page_size: i64,
    /// Age after which `notification_log` rows are purged, in days.
    pub notification_retention_days: i64,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                 |
    /// |-------------------------------|-------------------------|
    /// | `HOST`                        | `0.0.0.0`               |
    /// | `PORT`                        | `3000`                  |
    /// | `CORS_ORIGINS`                | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`        | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`       | `30`                    |
    /// | `DATABASE_URL`                | (none)                  |
    /// | `DIRECT_DATABASE_URL`         | (none)                  |
    /// | `SSE_HEARTBEAT_SECS`          | `30`                    |
    /// | `PAGE_SIZE`                   | `50`                    |
    /// | `NOTIFICATION_RETENTION_DAYS` | `7`                     |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let database_url = non_empty_var("DATABASE_URL");
        let direct_database_url = non_empty_var("DIRECT_DATABASE_URL");

        let sse_heartbeat_secs: u64 = std::env::var("SSE_HEARTBEAT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SSE_HEARTBEAT_SECS must be a valid u64");

        let page_size: i64 = std::env::var("PAGE_SIZE")
            .ok()
            .map(|v| v.parse().expect("PAGE_SIZE must be a valid i64"))
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let notification_retention_days: i64 = std::env::var("NOTIFICATION_RETENTION_DAYS")
            .unwrap_or_else(|_| "7".into())
            .parse()
            .expect("NOTIFICATION_RETENTION_DAYS must be a valid i64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            database_url,
            direct_database_url,
            sse_heartbeat_secs,
            page_size,
            notification_retention_days,
        }
    }

    /// Settings for the change-feed listener. The channel is the one the
    /// change-log trigger is migrated with.
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig::new(self.database_url.clone(), self.direct_database_url.clone())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
