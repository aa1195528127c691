//! JSON shapes exchanged with the log server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::LogEntry;

/// Canonical log entry payload accepted by `POST /logs` and `POST /logs/batch`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub actor: String,
    pub scope: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Client-generated id used by the server to drop duplicate deliveries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl From<&LogEntry> for LogPayload {
    fn from(entry: &LogEntry) -> Self {
        Self {
            kind: entry.kind.to_string(),
            message: entry.message.clone(),
            actor: entry.actor.clone(),
            scope: entry.scope.clone(),
            metadata: entry
                .metadata
                .as_ref()
                .and_then(|metadata| serde_json::to_value(metadata).ok()),
            timestamp: Some(entry.timestamp),
            client_id: Some(entry.client_id.to_string()),
        }
    }
}

/// Body of `POST /logs/batch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload<T = LogPayload> {
    pub logs: Vec<T>,
}

/// Result of a server-side undo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoReceipt {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub original_log: Value,
}

/// Extract the server-assigned id from a `{success, data: {id}}` response
pub fn created_log_id(body: &Value) -> Option<String> {
    id_text(body.get("data")?.get("id")?)
}

/// Server ids keyed by client id from a batch response's `ids` object.
///
/// Older servers omit the map; malformed keys are skipped.
pub fn batch_log_ids(body: &Value) -> HashMap<Uuid, String> {
    body.get("ids")
        .and_then(Value::as_object)
        .map(|ids| {
            ids.iter()
                .filter_map(|(client_id, id)| {
                    Some((Uuid::parse_str(client_id).ok()?, id_text(id)?))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(id) => Some(id.to_string()),
        Value::String(id) if !id.trim().is_empty() => Some(id.trim().to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityKind, EntitySnapshot, EventKind, LogId, LogMetadata};
    use serde_json::json;

    #[test]
    fn payload_uses_canonical_field_names() {
        let entry = LogEntry {
            local_id: LogId::new(3),
            server_id: None,
            client_id: Uuid::nil(),
            kind: EventKind::created(EntityKind::Menu),
            scope: "store-9".to_string(),
            actor: "user-2".to_string(),
            timestamp: 1_000,
            message: "Created menu \"Lunch\"".to_string(),
            metadata: Some(LogMetadata {
                post_data: Some(EntitySnapshot::named("Lunch")),
                ..LogMetadata::default()
            }),
            synced: false,
        };

        let value = serde_json::to_value(LogPayload::from(&entry)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "menu_created",
                "message": "Created menu \"Lunch\"",
                "actor": "user-2",
                "scope": "store-9",
                "metadata": {"postData": {"name": "Lunch"}},
                "timestamp": 1_000,
                "clientId": "00000000-0000-0000-0000-000000000000"
            })
        );
    }

    #[test]
    fn created_log_id_accepts_numbers_and_strings() {
        assert_eq!(
            created_log_id(&json!({"data": {"id": 12}})),
            Some("12".to_string())
        );
        assert_eq!(
            created_log_id(&json!({"data": {"id": "abc"}})),
            Some("abc".to_string())
        );
        assert_eq!(created_log_id(&json!({"data": {}})), None);
        assert_eq!(created_log_id(&json!({"success": true})), None);
    }

    #[test]
    fn batch_log_ids_skips_malformed_pairs() {
        let client_id = Uuid::now_v7();
        let mut ids = serde_json::Map::new();
        ids.insert(client_id.to_string(), json!(41));
        ids.insert("not-a-uuid".to_string(), json!(42));
        ids.insert(Uuid::nil().to_string(), Value::Null);
        let body = json!({ "success": true, "ids": ids });

        let ids = batch_log_ids(&body);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.get(&client_id).map(String::as_str), Some("41"));
        assert!(batch_log_ids(&json!({"success": true})).is_empty());
    }
}
