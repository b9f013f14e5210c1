//! Client configuration.

use gridsync_core::backoff::ReconnectConfig;
use gridsync_core::cache::DEFAULT_MAX_PAGES;

/// Settings for talking to a gridsync server.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server origin, e.g. `http://localhost:3000`. No trailing slash.
    pub base_url: String,
    /// Backoff applied between push-stream reconnects.
    pub reconnect: ReconnectConfig,
    /// Number of pages kept in the cache window.
    pub max_pages: usize,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            reconnect: ReconnectConfig::default(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Endpoint of the server's push stream.
    pub fn notifications_url(&self) -> String {
        format!("{}/api/table/notifications", self.base_url)
    }
}
