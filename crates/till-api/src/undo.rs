//! Reversal of logged entity mutations.
//!
//! The entry's own metadata is the only source of prior state: a create is
//! undone by deleting what `postData` names, an update by writing `preData`
//! back, and a delete by recreating `preData`.

use serde_json::json;
use thiserror::Error;
use till_core::models::{
    EntityKind, EntityMutation, EntitySnapshot, EventKind, LogMetadata, MetadataError,
};

use crate::store::{EntityFields, EntityStore, LogStore, NewServerLog, ServerLog};

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Undo not supported for this type: {0}")]
    Unsupported(String),
    #[error("Invalid undo metadata: {0}")]
    Invalid(#[from] MetadataError),
    #[error("{0} has no persisted id")]
    MissingId(String),
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct UndoOutcome {
    pub message: String,
    pub original: ServerLog,
    pub undo_entry: ServerLog,
}

/// Interprets one log entry and applies its inverse.
///
/// Callers run `undo` inside a transaction and commit only on success, so a
/// failed undo leaves neither a partial reversal nor an undo entry behind.
pub struct UndoEngine<'a, L, E> {
    logs: &'a L,
    entities: &'a E,
}

impl<'a, L: LogStore, E: EntityStore> UndoEngine<'a, L, E> {
    pub const fn new(logs: &'a L, entities: &'a E) -> Self {
        Self { logs, entities }
    }

    pub fn undo(&self, log_id: i64, now: i64) -> Result<UndoOutcome, UndoError> {
        let original = self
            .logs
            .get(log_id)?
            .ok_or_else(|| UndoError::NotFound(format!("log {log_id}")))?;

        let (kind, action) = original
            .kind
            .parse::<EventKind>()
            .ok()
            .and_then(EventKind::entity_mutation)
            .filter(|(kind, _)| kind.supports_undo())
            .ok_or_else(|| UndoError::Unsupported(original.kind.clone()))?;

        let metadata = original
            .metadata
            .as_deref()
            .map(LogMetadata::parse_lenient)
            .unwrap_or_default();
        let mutation = EntityMutation::from_metadata(action, metadata).map_err(|error| match error {
            MetadataError::UnsupportedAction(_) => UndoError::Unsupported(original.kind.clone()),
            other => UndoError::Invalid(other),
        })?;

        let description = match mutation {
            EntityMutation::Create { post } => self.undo_create(kind, &post, &original)?,
            EntityMutation::Update { pre, post } => self.undo_update(kind, &pre, &post, &original)?,
            EntityMutation::Delete { pre } => self.undo_delete(kind, pre, &original)?,
        };

        let (undo_entry, _) = self.logs.insert(&NewServerLog {
            kind: EventKind::Undo.to_string(),
            message: format!("Undid {}: {description}", original.kind),
            actor: original.actor.clone(),
            scope: original.scope.clone(),
            metadata: Some(
                json!({
                    "additionalData": {
                        "originalLogId": original.id,
                        "originalType": original.kind,
                    }
                })
                .to_string(),
            ),
            timestamp: now,
            client_id: None,
        })?;
        tracing::info!(log_id, kind = %original.kind, "Undid logged mutation");

        Ok(UndoOutcome {
            message: "Undo successful".to_string(),
            original,
            undo_entry,
        })
    }

    /// Find the entity a snapshot refers to: by id when recorded, then by name
    fn locate(
        &self,
        kind: EntityKind,
        snapshot: &EntitySnapshot,
        original: &ServerLog,
    ) -> Result<Option<EntitySnapshot>, UndoError> {
        if let Some(id) = snapshot.id {
            if let Some(found) = self.entities.find_by_id(kind, id)? {
                return Ok(Some(found));
            }
        }
        let name = snapshot.name().unwrap_or_default();
        Ok(self
            .entities
            .find_by_name(kind, name, scope_of(snapshot, original))?)
    }

    fn undo_create(
        &self,
        kind: EntityKind,
        post: &EntitySnapshot,
        original: &ServerLog,
    ) -> Result<String, UndoError> {
        let name = post.name().unwrap_or_default();
        let target = self
            .locate(kind, post, original)?
            .ok_or_else(|| UndoError::NotFound(format!("{kind} \"{name}\"")))?;
        let id = target
            .id
            .ok_or_else(|| UndoError::MissingId(format!("{kind} \"{name}\"")))?;

        self.entities.delete_by_id(kind, id)?;
        Ok(format!("deleted {kind} \"{name}\""))
    }

    fn undo_update(
        &self,
        kind: EntityKind,
        pre: &EntitySnapshot,
        post: &EntitySnapshot,
        original: &ServerLog,
    ) -> Result<String, UndoError> {
        let name = post.name().unwrap_or_default();
        let target = self
            .locate(kind, post, original)?
            .ok_or_else(|| UndoError::NotFound(format!("{kind} \"{name}\"")))?;
        let id = target
            .id
            .ok_or_else(|| UndoError::MissingId(format!("{kind} \"{name}\"")))?;

        let fields = EntityFields {
            name: pre.name().map(str::to_string),
            color: pre.color.clone(),
            count: pre.count,
            scope: pre.scope.clone(),
        };
        if !self.entities.update(kind, id, &fields)? {
            return Err(UndoError::NotFound(format!("{kind} \"{name}\"")));
        }
        Ok(format!(
            "restored {kind} \"{}\"",
            pre.name().unwrap_or_default()
        ))
    }

    fn undo_delete(
        &self,
        kind: EntityKind,
        pre: EntitySnapshot,
        original: &ServerLog,
    ) -> Result<String, UndoError> {
        let scope = scope_of(&pre, original).to_string();
        let snapshot = EntitySnapshot {
            // The recreated row gets a fresh id
            id: None,
            count: Some(pre.count.unwrap_or(0)),
            actor: pre.actor.clone().or_else(|| Some(original.actor.clone())),
            scope: Some(scope),
            ..pre
        };
        let created = self.entities.create(kind, &snapshot)?;
        Ok(format!(
            "recreated {kind} \"{}\"",
            created.name().unwrap_or_default()
        ))
    }
}

fn scope_of<'s>(snapshot: &'s EntitySnapshot, original: &'s ServerLog) -> &'s str {
    snapshot
        .scope
        .as_deref()
        .map(str::trim)
        .filter(|scope| !scope.is_empty())
        .unwrap_or(&original.scope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ServerDb, SqliteEntityStore, SqliteLogStore};
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn record(db: &ServerDb, kind: &str, metadata: Value) -> ServerLog {
        SqliteLogStore::new(db.connection())
            .insert(&NewServerLog {
                kind: kind.to_string(),
                message: "logged".to_string(),
                actor: "user-1".to_string(),
                scope: "store-1".to_string(),
                metadata: Some(metadata.to_string()),
                timestamp: 1_000,
                client_id: None,
            })
            .unwrap()
            .0
    }

    fn undo(db: &ServerDb, id: i64) -> Result<UndoOutcome, UndoError> {
        let logs = SqliteLogStore::new(db.connection());
        let entities = SqliteEntityStore::new(db.connection());
        UndoEngine::new(&logs, &entities).undo(id, 2_000)
    }

    fn place(db: &ServerDb, name: &str) -> Option<EntitySnapshot> {
        SqliteEntityStore::new(db.connection())
            .find_by_name(EntityKind::Place, name, "store-1")
            .unwrap()
    }

    #[test]
    fn undo_create_deletes_entity_and_second_undo_is_not_found() {
        let db = ServerDb::open_in_memory().unwrap();
        SqliteEntityStore::new(db.connection())
            .create(EntityKind::Place, &EntitySnapshot::named("Bar").with_scope("store-1"))
            .unwrap();
        let log = record(&db, "place_created", json!({"postData": {"name": "Bar"}}));

        let outcome = undo(&db, log.id).unwrap();
        assert_eq!(outcome.message, "Undo successful");
        assert_eq!(outcome.undo_entry.kind, "undo");
        assert_eq!(outcome.original.id, log.id);
        assert_eq!(place(&db, "Bar"), None);

        assert!(matches!(undo(&db, log.id), Err(UndoError::NotFound(_))));
    }

    #[test]
    fn undo_update_restores_pre_values() {
        let db = ServerDb::open_in_memory().unwrap();
        SqliteEntityStore::new(db.connection())
            .create(
                EntityKind::Place,
                &EntitySnapshot::named("B").with_color("blue").with_scope("store-1"),
            )
            .unwrap();
        let log = record(
            &db,
            "place_updated",
            json!({
                "preData": {"name": "A", "color": "red"},
                "postData": {"name": "B", "color": "blue"}
            }),
        );

        undo(&db, log.id).unwrap();

        let restored = place(&db, "A").unwrap();
        assert_eq!(restored.color.as_deref(), Some("red"));
        assert_eq!(place(&db, "B"), None);
    }

    #[test]
    fn undo_delete_recreates_snapshot() {
        let db = ServerDb::open_in_memory().unwrap();
        let log = record(
            &db,
            "place_deleted",
            json!({"preData": {"name": "C", "color": "green", "count": 3}}),
        );

        undo(&db, log.id).unwrap();

        let recreated = place(&db, "C").unwrap();
        assert_eq!(recreated.color.as_deref(), Some("green"));
        assert_eq!(recreated.count, Some(3));
        assert_eq!(recreated.scope.as_deref(), Some("store-1"));
        assert_eq!(recreated.actor.as_deref(), Some("user-1"));
    }

    #[test]
    fn undo_prefers_recorded_id_over_name() {
        let db = ServerDb::open_in_memory().unwrap();
        let entities = SqliteEntityStore::new(db.connection());
        entities
            .create(EntityKind::Menu, &EntitySnapshot::named("Lunch").with_scope("store-1"))
            .unwrap();
        let second = entities
            .create(EntityKind::Menu, &EntitySnapshot::named("Lunch").with_scope("store-1"))
            .unwrap();
        let second_id = second.id.unwrap();

        let log = record(
            &db,
            "menu_created",
            json!({"postData": {"id": second_id, "name": "Lunch"}}),
        );
        undo(&db, log.id).unwrap();

        let remaining = entities.list(EntityKind::Menu, "store-1").unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, Some(second_id));
    }

    #[test]
    fn double_encoded_metadata_is_accepted() {
        let db = ServerDb::open_in_memory().unwrap();
        let encoded = json!({"preData": {"name": "Drinks"}}).to_string();
        let log = record(&db, "category_deleted", Value::String(encoded));

        undo(&db, log.id).unwrap();
        assert!(SqliteEntityStore::new(db.connection())
            .find_by_name(EntityKind::Category, "Drinks", "store-1")
            .unwrap()
            .is_some());
    }

    #[test]
    fn unsupported_and_invalid_entries_are_rejected() {
        let db = ServerDb::open_in_memory().unwrap();
        let table = record(&db, "table_created", json!({"postData": {"name": "T1"}}));
        assert!(matches!(undo(&db, table.id), Err(UndoError::Unsupported(_))));

        let navigation = record(&db, "navigation", json!({}));
        assert!(matches!(undo(&db, navigation.id), Err(UndoError::Unsupported(_))));

        let reorder = record(&db, "menu_reordered", json!({"additionalData": {"order": ["A"]}}));
        assert!(matches!(undo(&db, reorder.id), Err(UndoError::Unsupported(_))));

        let nameless = record(&db, "place_created", json!({"postData": {"color": "red"}}));
        assert!(matches!(undo(&db, nameless.id), Err(UndoError::Invalid(_))));

        let missing = record(&db, "place_created", json!("not json at all"));
        assert!(matches!(undo(&db, missing.id), Err(UndoError::Invalid(_))));

        assert!(matches!(undo(&db, 999), Err(UndoError::NotFound(_))));
    }

    #[test]
    fn failed_undo_appends_nothing() {
        let db = ServerDb::open_in_memory().unwrap();
        let log = record(&db, "place_created", json!({"postData": {"name": "Ghost"}}));

        assert!(undo(&db, log.id).is_err());
        let logs = SqliteLogStore::new(db.connection()).list(10).unwrap();
        assert_eq!(logs.len(), 1);
    }
}
