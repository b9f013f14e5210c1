//! Change notifications emitted by the `data_table` change-feed.
//!
//! Every committed row change is recorded in `notification_log` by a
//! database trigger. The log row id travels through the feed; the full
//! record is resolved and validated here into a [`ChangeNotification`]
//! before it is pushed to clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DbId, RowId, Timestamp};

// ---------------------------------------------------------------------------
// ChangeAction
// ---------------------------------------------------------------------------

/// The kind of row mutation a notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
}

impl ChangeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Insert => "INSERT",
            ChangeAction::Update => "UPDATE",
            ChangeAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeAction {
    type Err = PayloadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INSERT" => Ok(ChangeAction::Insert),
            "UPDATE" => Ok(ChangeAction::Update),
            "DELETE" => Ok(ChangeAction::Delete),
            other => Err(PayloadError::UnknownAction(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// PayloadError
// ---------------------------------------------------------------------------

/// Reasons a stored notification payload fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("Notification payload must be a JSON object")]
    NotAnObject,

    #[error("Notification payload is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Notification payload field '{field}' must be {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Unknown change action '{0}'")]
    UnknownAction(String),
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

/// Old and new value of a single column in an UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    #[serde(default)]
    pub old: Value,
    #[serde(default)]
    pub new: Value,
}

/// The row-level body of a change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    /// Id of the changed row.
    pub id: RowId,
    pub table: String,
    pub action: ChangeAction,
    pub timestamp: String,
    /// Full row image after the change (before it, for DELETE).
    #[serde(default)]
    pub data: Map<String, Value>,
    /// Per-column differences; empty for INSERT and DELETE.
    #[serde(default)]
    pub changes: Map<String, Value>,
}

impl NotificationPayload {
    /// Validate an untyped payload as stored in `notification_log.payload`.
    ///
    /// `data` and `changes` may be absent and default to empty objects; any
    /// field that is present with the wrong shape is rejected.
    pub fn validate(raw: &Value) -> Result<Self, PayloadError> {
        let obj = raw.as_object().ok_or(PayloadError::NotAnObject)?;

        let id = obj
            .get("id")
            .ok_or(PayloadError::MissingField("id"))?
            .as_i64()
            .ok_or(PayloadError::InvalidField {
                field: "id",
                expected: "an integer",
            })?;

        let table = required_str(obj, "table")?.to_string();
        let action = required_str(obj, "action")?.parse()?;
        let timestamp = required_str(obj, "timestamp")?.to_string();
        let data = optional_object(obj, "data")?;
        let changes = optional_object(obj, "changes")?;

        for change in changes.values() {
            if !change.is_object() {
                return Err(PayloadError::InvalidField {
                    field: "changes",
                    expected: "an object of {old, new} entries",
                });
            }
        }

        Ok(Self {
            id,
            table,
            action,
            timestamp,
            data,
            changes,
        })
    }

    /// Typed view over [`changes`](Self::changes). Entries that are not
    /// `{old, new}` objects are skipped.
    pub fn field_changes(&self) -> impl Iterator<Item = (&str, FieldChange)> {
        self.changes.iter().filter_map(|(column, change)| {
            serde_json::from_value::<FieldChange>(change.clone())
                .ok()
                .map(|c| (column.as_str(), c))
        })
    }
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, PayloadError> {
    obj.get(field)
        .ok_or(PayloadError::MissingField(field))?
        .as_str()
        .ok_or(PayloadError::InvalidField {
            field,
            expected: "a string",
        })
}

fn optional_object(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Map<String, Value>, PayloadError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(PayloadError::InvalidField {
            field,
            expected: "an object",
        }),
    }
}

// ---------------------------------------------------------------------------
// ChangeNotification
// ---------------------------------------------------------------------------

/// Identity of a notification for duplicate suppression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub table_name: String,
    pub source_id: DbId,
}

/// A fully resolved change notification as delivered to push subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Id of the `notification_log` entry. Serialized as a string.
    #[serde(with = "id_as_string", alias = "logId")]
    pub source_id: DbId,
    pub table_name: String,
    pub action: ChangeAction,
    pub payload: NotificationPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
}

impl ChangeNotification {
    /// Build a notification from the columns of a `notification_log` row.
    pub fn from_log(
        source_id: DbId,
        table_name: impl Into<String>,
        action: &str,
        payload: &Value,
        created_at: Timestamp,
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            source_id,
            table_name: table_name.into(),
            action: action.parse()?,
            payload: NotificationPayload::validate(payload)?,
            created_at: Some(created_at),
        })
    }

    /// Parse a notification from an SSE `data:` line.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            table_name: self.table_name.clone(),
            source_id: self.source_id,
        }
    }

    /// Id of the row this notification is about.
    pub fn row_id(&self) -> RowId {
        self.payload.id
    }
}

/// Serde adapter that writes a 64-bit id as a decimal string and reads it
/// back from either a string or a number.
mod id_as_string {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::types::DbId;

    pub fn serialize<S: Serializer>(id: &DbId, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DbId, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(DbId),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(id),
            Raw::Text(text) => text
                .trim()
                .parse()
                .map_err(|_| D::Error::custom(format!("invalid id '{text}'"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn valid_payload() -> Value {
        json!({
            "id": 100,
            "table": "data_table",
            "action": "UPDATE",
            "timestamp": "2026-01-01T00:00:00Z",
            "data": {"id": 100, "col_n_01": 7},
            "changes": {"col_n_01": {"old": 3, "new": 7}}
        })
    }

    #[test]
    fn validates_well_formed_payload() {
        let payload = NotificationPayload::validate(&valid_payload()).unwrap();
        assert_eq!(payload.id, 100);
        assert_eq!(payload.action, ChangeAction::Update);
        assert_eq!(payload.data["col_n_01"], 7);

        let changes: Vec<_> = payload.field_changes().collect();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "col_n_01");
        assert_eq!(changes[0].1.new, json!(7));
    }

    #[test]
    fn missing_data_and_changes_default_to_empty() {
        let raw = json!({
            "id": 1,
            "table": "data_table",
            "action": "DELETE",
            "timestamp": "2026-01-01T00:00:00Z"
        });
        let payload = NotificationPayload::validate(&raw).unwrap();
        assert!(payload.data.is_empty());
        assert!(payload.changes.is_empty());
    }

    #[test]
    fn rejects_non_object_payload() {
        assert_matches!(
            NotificationPayload::validate(&json!([1, 2])),
            Err(PayloadError::NotAnObject)
        );
    }

    #[test]
    fn rejects_wrongly_typed_fields_instead_of_defaulting() {
        let mut raw = valid_payload();
        raw["id"] = json!("100");
        assert_matches!(
            NotificationPayload::validate(&raw),
            Err(PayloadError::InvalidField { field: "id", .. })
        );

        let mut raw = valid_payload();
        raw["data"] = json!("oops");
        assert_matches!(
            NotificationPayload::validate(&raw),
            Err(PayloadError::InvalidField { field: "data", .. })
        );

        let mut raw = valid_payload();
        raw["changes"] = json!({"col_n_01": 5});
        assert_matches!(
            NotificationPayload::validate(&raw),
            Err(PayloadError::InvalidField { field: "changes", .. })
        );
    }

    #[test]
    fn rejects_missing_and_unknown_action() {
        let mut raw = valid_payload();
        raw.as_object_mut().unwrap().remove("action");
        assert_matches!(
            NotificationPayload::validate(&raw),
            Err(PayloadError::MissingField("action"))
        );

        raw["action"] = json!("TRUNCATE");
        assert_matches!(
            NotificationPayload::validate(&raw),
            Err(PayloadError::UnknownAction(a)) if a == "TRUNCATE"
        );
    }

    #[test]
    fn source_id_round_trips_as_string() {
        let notification = ChangeNotification::from_log(
            7,
            "data_table",
            "UPDATE",
            &valid_payload(),
            chrono::Utc::now(),
        )
        .unwrap();

        let text = serde_json::to_string(&notification).unwrap();
        assert!(text.contains(r#""sourceId":"7""#));

        let parsed = ChangeNotification::from_json(&text).unwrap();
        assert_eq!(parsed.dedup_key(), notification.dedup_key());
        assert_eq!(parsed.row_id(), 100);
    }

    #[test]
    fn accepts_legacy_log_id_and_numeric_ids() {
        let text = json!({
            "logId": 9,
            "tableName": "data_table",
            "action": "INSERT",
            "payload": valid_payload(),
        })
        .to_string();
        let parsed = ChangeNotification::from_json(&text).unwrap();
        assert_eq!(parsed.source_id, 9);
        assert_eq!(parsed.action, ChangeAction::Insert);
        assert!(parsed.created_at.is_none());
    }
}
