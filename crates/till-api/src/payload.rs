//! Normalisation of incoming log payloads.
//!
//! Two shapes are accepted: the canonical `{type, message, actor, scope,
//! metadata, timestamp, clientId}` and the older
//! `{eventId, text, userId, storeNumber, additionalData}`.

use serde_json::Value;
use till_core::models::EventKind;

use crate::error::AppError;
use crate::store::NewServerLog;

/// Accepted spellings per field, canonical name first
const KIND_KEYS: &[&str] = &["type", "eventId"];
const MESSAGE_KEYS: &[&str] = &["message", "text"];
const ACTOR_KEYS: &[&str] = &["actor", "userId"];
const SCOPE_KEYS: &[&str] = &["scope", "storeNumber"];
const METADATA_KEYS: &[&str] = &["metadata", "additionalData"];

pub fn normalize_log(payload: &Value, now: i64) -> Result<NewServerLog, AppError> {
    let object = payload
        .as_object()
        .ok_or_else(|| AppError::validation("log payload must be a JSON object"))?;
    let field = |keys: &[&str]| keys.iter().find_map(|key| text_value(object.get(*key)?));

    let kind = field(KIND_KEYS);
    let message = field(MESSAGE_KEYS);
    let actor = field(ACTOR_KEYS);
    let scope = field(SCOPE_KEYS);

    let missing: Vec<&str> = [
        ("type", kind.is_none()),
        ("message", message.is_none()),
        ("actor", actor.is_none()),
        ("scope", scope.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    let (Some(kind), Some(message), Some(actor), Some(scope)) = (kind, message, actor, scope) else {
        return Err(AppError::validation(format!(
            "missing required fields: {}",
            missing.join(", ")
        )));
    };

    // Known kinds are stored under their canonical wire name
    let kind = kind
        .parse::<EventKind>()
        .map_or(kind, |parsed| parsed.to_string());

    let metadata = METADATA_KEYS
        .iter()
        .find_map(|key| object.get(*key))
        .and_then(metadata_text);

    let timestamp = object
        .get("timestamp")
        .and_then(Value::as_i64)
        .unwrap_or(now);
    let client_id = object.get("clientId").and_then(text_value);

    Ok(NewServerLog {
        kind,
        message,
        actor,
        scope,
        metadata,
        timestamp,
        client_id,
    })
}

/// Trimmed non-empty text; numbers are accepted for identifiers
fn text_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Metadata is stored as JSON text; string payloads are kept verbatim so a
/// double-encoded value survives for the tolerant reader
fn metadata_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn canonical_payload_is_accepted() {
        let log = normalize_log(
            &json!({
                "type": "place_created",
                "message": "Created place \"Bar\"",
                "actor": "user-1",
                "scope": "store-1",
                "metadata": {"postData": {"name": "Bar"}},
                "timestamp": 42,
                "clientId": "0191c7f0-0000-7000-8000-000000000000"
            }),
            1_000,
        )
        .unwrap();

        assert_eq!(log.kind, "place_created");
        assert_eq!(log.timestamp, 42);
        assert_eq!(log.metadata.as_deref(), Some(r#"{"postData":{"name":"Bar"}}"#));
        assert!(log.client_id.is_some());
    }

    #[test]
    fn alternate_payload_is_normalised() {
        let log = normalize_log(
            &json!({
                "eventId": "menu-deleted",
                "text": "Deleted menu \"Lunch\"",
                "userId": "user-2",
                "storeNumber": 17,
                "additionalData": "{\"preData\":{\"name\":\"Lunch\"}}"
            }),
            1_000,
        )
        .unwrap();

        assert_eq!(log.kind, "menu_deleted");
        assert_eq!(log.scope, "17");
        assert_eq!(log.actor, "user-2");
        assert_eq!(log.timestamp, 1_000);
        assert_eq!(log.metadata.as_deref(), Some("{\"preData\":{\"name\":\"Lunch\"}}"));
    }

    #[test]
    fn missing_fields_are_listed() {
        let err = normalize_log(&json!({"type": "navigation", "message": "  "}), 0).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("message"));
        assert!(message.contains("actor"));
        assert!(message.contains("scope"));
        assert!(!message.contains("type,"));
    }

    #[test]
    fn unknown_kinds_are_kept_verbatim() {
        let log = normalize_log(
            &json!({"type": "custom", "message": "m", "actor": "a", "scope": "s"}),
            0,
        )
        .unwrap();
        assert_eq!(log.kind, "custom");
        assert_eq!(log.metadata, None);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(normalize_log(&json!([1, 2]), 0).is_err());
    }
}
