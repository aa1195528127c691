use std::collections::HashMap;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;

const LOG_COLUMNS: &str = "id, client_id, kind, message, actor, scope, metadata, timestamp, created_at";

/// A log entry as stored by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLog {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub actor: String,
    pub scope: String,
    /// Stored verbatim; rendered as JSON when it parses
    #[serde(serialize_with = "metadata_as_json")]
    pub metadata: Option<String>,
    pub timestamp: i64,
    pub created_at: i64,
}

/// Normalised insert request
#[derive(Debug, Clone, PartialEq)]
pub struct NewServerLog {
    pub kind: String,
    pub message: String,
    pub actor: String,
    pub scope: String,
    pub metadata: Option<String>,
    pub timestamp: i64,
    pub client_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Rows actually written; duplicates of known client ids are not counted
    pub inserted: usize,
    /// Server id for every entry that carried a client id
    pub ids: HashMap<String, i64>,
}

pub trait LogStore {
    /// Insert one entry. A known client id returns the stored entry and `false`.
    fn insert(&self, log: &NewServerLog) -> rusqlite::Result<(ServerLog, bool)>;

    /// Insert many entries; callers wrap this in a transaction
    fn insert_batch(&self, logs: &[NewServerLog]) -> rusqlite::Result<BatchOutcome>;

    fn get(&self, id: i64) -> rusqlite::Result<Option<ServerLog>>;

    /// Newest first
    fn list(&self, limit: usize) -> rusqlite::Result<Vec<ServerLog>>;

    fn list_by_scope(&self, scope: &str, limit: usize) -> rusqlite::Result<Vec<ServerLog>>;

    fn list_by_kind(&self, kind: &str, limit: usize) -> rusqlite::Result<Vec<ServerLog>>;

    fn delete(&self, id: i64) -> rusqlite::Result<bool>;
}

pub struct SqliteLogStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLogStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_log(row: &Row<'_>) -> rusqlite::Result<ServerLog> {
        Ok(ServerLog {
            id: row.get(0)?,
            client_id: row.get(1)?,
            kind: row.get(2)?,
            message: row.get(3)?,
            actor: row.get(4)?,
            scope: row.get(5)?,
            metadata: row.get(6)?,
            timestamp: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn query_logs(&self, sql: &str, params: impl rusqlite::Params) -> rusqlite::Result<Vec<ServerLog>> {
        let mut stmt = self.conn.prepare(sql)?;
        let logs = stmt
            .query_map(params, Self::parse_log)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    fn find_by_client_id(&self, client_id: &str) -> rusqlite::Result<Option<ServerLog>> {
        self.conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM logs WHERE client_id = ?"),
                params![client_id],
                Self::parse_log,
            )
            .optional()
    }

    /// Returns the new row id, or `None` when the client id is already known
    fn insert_row(&self, log: &NewServerLog) -> rusqlite::Result<Option<i64>> {
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO logs (client_id, kind, message, actor, scope, metadata, timestamp, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                log.client_id,
                log.kind,
                log.message,
                log.actor,
                log.scope,
                log.metadata,
                log.timestamp,
                chrono::Utc::now().timestamp_millis(),
            ],
        )?;
        Ok((rows > 0).then(|| self.conn.last_insert_rowid()))
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl LogStore for SqliteLogStore<'_> {
    fn insert(&self, log: &NewServerLog) -> rusqlite::Result<(ServerLog, bool)> {
        if let Some(id) = self.insert_row(log)? {
            let stored = self
                .get(id)?
                .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
            return Ok((stored, true));
        }

        let client_id = log.client_id.as_deref().unwrap_or_default();
        let existing = self
            .find_by_client_id(client_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)?;
        tracing::debug!(client_id, id = existing.id, "Ignored duplicate log delivery");
        Ok((existing, false))
    }

    fn insert_batch(&self, logs: &[NewServerLog]) -> rusqlite::Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        for log in logs {
            let (stored, inserted) = self.insert(log)?;
            if inserted {
                outcome.inserted += 1;
            }
            if let Some(client_id) = stored.client_id {
                outcome.ids.insert(client_id, stored.id);
            }
        }
        Ok(outcome)
    }

    fn get(&self, id: i64) -> rusqlite::Result<Option<ServerLog>> {
        self.conn
            .query_row(
                &format!("SELECT {LOG_COLUMNS} FROM logs WHERE id = ?"),
                params![id],
                Self::parse_log,
            )
            .optional()
    }

    fn list(&self, limit: usize) -> rusqlite::Result<Vec<ServerLog>> {
        self.query_logs(
            &format!("SELECT {LOG_COLUMNS} FROM logs ORDER BY timestamp DESC, id DESC LIMIT ?"),
            params![sql_limit(limit)],
        )
    }

    fn list_by_scope(&self, scope: &str, limit: usize) -> rusqlite::Result<Vec<ServerLog>> {
        self.query_logs(
            &format!(
                "SELECT {LOG_COLUMNS} FROM logs WHERE scope = ?
                 ORDER BY timestamp DESC, id DESC LIMIT ?"
            ),
            params![scope, sql_limit(limit)],
        )
    }

    fn list_by_kind(&self, kind: &str, limit: usize) -> rusqlite::Result<Vec<ServerLog>> {
        self.query_logs(
            &format!(
                "SELECT {LOG_COLUMNS} FROM logs WHERE kind = ?
                 ORDER BY timestamp DESC, id DESC LIMIT ?"
            ),
            params![kind, sql_limit(limit)],
        )
    }

    fn delete(&self, id: i64) -> rusqlite::Result<bool> {
        let rows = self.conn.execute("DELETE FROM logs WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }
}

#[allow(clippy::ref_option)]
fn metadata_as_json<S: serde::Serializer>(
    metadata: &Option<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match metadata {
        None => serializer.serialize_none(),
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => value.serialize(serializer),
            Err(_) => serializer.serialize_str(raw),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ServerDb;
    use pretty_assertions::assert_eq;

    fn log(message: &str, client_id: Option<&str>) -> NewServerLog {
        NewServerLog {
            kind: "navigation".to_string(),
            message: message.to_string(),
            actor: "user-1".to_string(),
            scope: "store-1".to_string(),
            metadata: None,
            timestamp: 1_000,
            client_id: client_id.map(str::to_string),
        }
    }

    #[test]
    fn duplicate_client_id_returns_existing_entry() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());

        let (first, inserted) = store.insert(&log("first", Some("c-1"))).unwrap();
        assert!(inserted);
        let (second, inserted) = store.insert(&log("again", Some("c-1"))).unwrap();
        assert!(!inserted);
        assert_eq!(second.id, first.id);
        assert_eq!(second.message, "first");
        assert_eq!(store.list(10).unwrap().len(), 1);
    }

    #[test]
    fn entries_without_client_id_are_never_deduplicated() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());

        store.insert(&log("a", None)).unwrap();
        store.insert(&log("a", None)).unwrap();
        assert_eq!(store.list(10).unwrap().len(), 2);
    }

    #[test]
    fn batch_reports_inserted_rows_and_ids() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());
        store.insert(&log("known", Some("c-1"))).unwrap();

        let outcome = store
            .insert_batch(&[log("known", Some("c-1")), log("new", Some("c-2")), log("bare", None)])
            .unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.ids.len(), 2);
        assert_eq!(store.list(10).unwrap().len(), 3);
    }

    #[test]
    fn filters_by_scope_and_kind() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());
        store.insert(&log("a", None)).unwrap();
        store
            .insert(&NewServerLog {
                kind: "place_created".to_string(),
                scope: "store-2".to_string(),
                ..log("b", None)
            })
            .unwrap();

        let by_scope = store.list_by_scope("store-2", 10).unwrap();
        assert_eq!(by_scope.len(), 1);
        assert_eq!(by_scope[0].message, "b");
        assert_eq!(store.list_by_kind("navigation", 10).unwrap().len(), 1);
    }

    #[test]
    fn metadata_serializes_as_json_when_possible() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());
        let (stored, _) = store
            .insert(&NewServerLog {
                metadata: Some(r#"{"postData":{"name":"Bar"}}"#.to_string()),
                ..log("a", None)
            })
            .unwrap();

        let value = serde_json::to_value(&stored).unwrap();
        assert_eq!(value["metadata"]["postData"]["name"], "Bar");
        assert_eq!(value["type"], "navigation");
    }

    #[test]
    fn delete_reports_missing_rows() {
        let db = ServerDb::open_in_memory().unwrap();
        let store = SqliteLogStore::new(db.connection());
        let (stored, _) = store.insert(&log("a", None)).unwrap();

        assert!(store.delete(stored.id).unwrap());
        assert!(!store.delete(stored.id).unwrap());
        assert_eq!(store.get(stored.id).unwrap(), None);
    }
}
