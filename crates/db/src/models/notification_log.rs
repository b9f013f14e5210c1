//! Notification log entity model.

use gridsync_core::notification::{ChangeNotification, PayloadError};
use gridsync_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `notification_log` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NotificationLog {
    pub id: DbId,
    pub table_name: String,
    pub action: String,
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
}

impl NotificationLog {
    /// Validate the stored payload and build the pushed notification.
    pub fn to_notification(&self) -> Result<ChangeNotification, PayloadError> {
        ChangeNotification::from_log(
            self.id,
            self.table_name.clone(),
            &self.action,
            &self.payload,
            self.created_at,
        )
    }
}
