//! Log queue repository implementation

use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EventKind, LogEntry, LogId, LogMetadata, NewLogEntry};
use crate::util::unix_millis_now;

const SESSION_START_KEY: &str = "session_start";
const SESSION_SCOPE_KEY: &str = "session_scope";
const SESSION_ACTOR_KEY: &str = "session_actor";

const ENTRY_COLUMNS: &str =
    "local_id, server_id, client_id, kind, scope, actor, timestamp, message, metadata, synced";

/// Trait for local log queue storage operations
pub trait LogQueueRepository {
    /// Append a new entry; assigns id, client id and timestamp, unsynced
    fn append(&self, entry: NewLogEntry) -> Result<LogEntry>;

    /// Get an entry by local id
    fn get(&self, id: LogId) -> Result<Option<LogEntry>>;

    /// Most recent entries first
    fn recent(&self, limit: usize) -> Result<Vec<LogEntry>>;

    /// Most recent entries first, excluding entries older than `since` (Unix ms)
    fn recent_since(&self, since: i64, limit: usize) -> Result<Vec<LogEntry>>;

    /// Every entry, most recent first
    fn all(&self) -> Result<Vec<LogEntry>>;

    /// Unsynced entries in append order
    fn unsynced(&self) -> Result<Vec<LogEntry>>;

    /// Number of unsynced entries
    fn pending_count(&self) -> Result<usize>;

    /// Flip entries to synced; returns how many changed state
    fn mark_synced(&self, ids: &[LogId]) -> Result<usize>;

    /// Mark a single entry synced and record the server id that acknowledged it
    fn mark_acknowledged(&self, id: LogId, server_id: &str) -> Result<()>;

    /// Hard delete one entry
    fn delete_by_id(&self, id: LogId) -> Result<bool>;

    /// Wipe the whole queue and every piece of session state
    fn clear_all(&self) -> Result<usize>;

    /// Session start marker (Unix ms), if a session is active
    fn session_start(&self) -> Result<Option<i64>>;

    /// Set or clear the session start marker
    fn set_session_start(&self, at: Option<i64>) -> Result<()>;

    /// Scope and actor of the active session
    fn session_identity(&self) -> Result<Option<(String, String)>>;

    /// Set or clear the scope and actor of the active session
    fn set_session_identity(&self, identity: Option<(&str, &str)>) -> Result<()>;
}

/// `SQLite` implementation of `LogQueueRepository`
pub struct SqliteLogQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLogQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a log entry from a database row
    fn parse_entry(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
        let client_id: String = row.get(2)?;
        let kind: String = row.get(3)?;
        let metadata: Option<String> = row.get(8)?;

        Ok(LogEntry {
            local_id: LogId::new(row.get(0)?),
            server_id: row.get(1)?,
            client_id: Uuid::parse_str(&client_id)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?,
            kind: kind
                .parse::<EventKind>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?,
            scope: row.get(4)?,
            actor: row.get(5)?,
            timestamp: row.get(6)?,
            message: row.get(7)?,
            metadata: metadata
                .map(|raw| LogMetadata::parse_lenient(&raw))
                .filter(|metadata| !metadata.is_empty()),
            synced: row.get(9)?,
        })
    }

    fn query_entries(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<LogEntry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let entries = stmt
            .query_map(params, Self::parse_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Next timestamp that keeps entry times non-decreasing on this device
    fn next_timestamp(&self) -> Result<i64> {
        let last: Option<i64> =
            self.conn
                .query_row("SELECT MAX(timestamp) FROM log_entries", [], |row| row.get(0))?;
        let now = unix_millis_now();
        Ok(last.map_or(now, |last| now.max(last)))
    }
}

impl SqliteLogQueueRepository<'_> {
    fn state_value(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM session_state WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_state_value(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.conn.execute(
                "INSERT OR REPLACE INTO session_state (key, value) VALUES (?, ?)",
                params![key, value],
            )?,
            None => self
                .conn
                .execute("DELETE FROM session_state WHERE key = ?", params![key])?,
        };
        Ok(())
    }
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl LogQueueRepository for SqliteLogQueueRepository<'_> {
    fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let timestamp = self.next_timestamp()?;
        let client_id = Uuid::now_v7();
        let metadata = entry
            .metadata
            .as_ref()
            .filter(|metadata| !metadata.is_empty())
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO log_entries (client_id, kind, scope, actor, timestamp, message, metadata, synced)
             VALUES (?, ?, ?, ?, ?, ?, ?, 0)",
            params![
                client_id.to_string(),
                entry.kind.to_string(),
                entry.scope,
                entry.actor,
                timestamp,
                entry.message,
                metadata,
            ],
        )?;
        let local_id = LogId::new(self.conn.last_insert_rowid());

        Ok(LogEntry {
            local_id,
            server_id: None,
            client_id,
            kind: entry.kind,
            scope: entry.scope,
            actor: entry.actor,
            timestamp,
            message: entry.message,
            metadata: entry.metadata.filter(|metadata| !metadata.is_empty()),
            synced: false,
        })
    }

    fn get(&self, id: LogId) -> Result<Option<LogEntry>> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM log_entries WHERE local_id = ?"),
                params![id.get()],
                Self::parse_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries(
            &format!("SELECT {ENTRY_COLUMNS} FROM log_entries ORDER BY local_id DESC LIMIT ?"),
            params![sql_limit(limit)],
        )
    }

    fn recent_since(&self, since: i64, limit: usize) -> Result<Vec<LogEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM log_entries
                 WHERE timestamp >= ?
                 ORDER BY local_id DESC
                 LIMIT ?"
            ),
            params![since, sql_limit(limit)],
        )
    }

    fn all(&self) -> Result<Vec<LogEntry>> {
        self.query_entries(
            &format!("SELECT {ENTRY_COLUMNS} FROM log_entries ORDER BY local_id DESC"),
            [],
        )
    }

    fn unsynced(&self) -> Result<Vec<LogEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM log_entries WHERE synced = 0 ORDER BY local_id ASC"
            ),
            [],
        )
    }

    fn pending_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM log_entries WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn mark_synced(&self, ids: &[LogId]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut changed = 0;
        {
            let mut stmt =
                tx.prepare("UPDATE log_entries SET synced = 1 WHERE local_id = ? AND synced = 0")?;
            for id in ids {
                changed += stmt.execute(params![id.get()])?;
            }
        }
        tx.commit()?;
        Ok(changed)
    }

    fn mark_acknowledged(&self, id: LogId, server_id: &str) -> Result<()> {
        self.conn.execute(
            "UPDATE log_entries
             SET synced = 1, server_id = COALESCE(server_id, ?)
             WHERE local_id = ?",
            params![server_id, id.get()],
        )?;
        Ok(())
    }

    fn delete_by_id(&self, id: LogId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM log_entries WHERE local_id = ?", params![id.get()])?;
        Ok(rows > 0)
    }

    fn clear_all(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let rows = tx.execute("DELETE FROM log_entries", [])?;
        tx.execute("DELETE FROM session_state", [])?;
        tx.commit()?;
        Ok(rows)
    }

    fn session_start(&self) -> Result<Option<i64>> {
        Ok(self
            .state_value(SESSION_START_KEY)?
            .and_then(|value| value.parse().ok()))
    }

    fn set_session_start(&self, at: Option<i64>) -> Result<()> {
        self.set_state_value(SESSION_START_KEY, at.map(|at| at.to_string()).as_deref())
    }

    fn session_identity(&self) -> Result<Option<(String, String)>> {
        let scope = self.state_value(SESSION_SCOPE_KEY)?;
        let actor = self.state_value(SESSION_ACTOR_KEY)?;
        Ok(scope.zip(actor))
    }

    fn set_session_identity(&self, identity: Option<(&str, &str)>) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let (scope, actor) = identity.unzip();
        self.set_state_value(SESSION_SCOPE_KEY, scope)?;
        self.set_state_value(SESSION_ACTOR_KEY, actor)?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{EntityKind, EntitySnapshot};
    use pretty_assertions::assert_eq;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn entry(message: &str) -> NewLogEntry {
        NewLogEntry::new(EventKind::Navigation, "store-1", "user-1", message)
    }

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|entry| entry.message.as_str()).collect()
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let first = repo.append(entry("one")).unwrap();
        let second = repo.append(entry("two")).unwrap();

        assert!(second.local_id > first.local_id);
        assert!(second.timestamp >= first.timestamp);
        assert_ne!(first.client_id, second.client_id);
        assert!(!first.synced);
    }

    #[test]
    fn test_unsynced_returns_appended_set_in_order() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        for message in ["a", "b", "c", "d"] {
            repo.append(entry(message)).unwrap();
        }

        let unsynced = repo.unsynced().unwrap();
        assert_eq!(messages(&unsynced), vec!["a", "b", "c", "d"]);
        assert_eq!(repo.pending_count().unwrap(), 4);
    }

    #[test]
    fn test_mark_synced_leaves_complement_pending() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let a = repo.append(entry("a")).unwrap();
        let b = repo.append(entry("b")).unwrap();
        repo.append(entry("c")).unwrap();

        assert_eq!(repo.mark_synced(&[a.local_id, b.local_id]).unwrap(), 2);
        // Idempotent
        assert_eq!(repo.mark_synced(&[a.local_id]).unwrap(), 0);

        assert_eq!(messages(&repo.unsynced().unwrap()), vec!["c"]);

        let all = repo.all().unwrap();
        assert_eq!(messages(&all), vec!["c", "b", "a"]);
        assert!(all.iter().filter(|e| e.message != "c").all(|e| e.synced));
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        for message in ["a", "b", "c"] {
            repo.append(entry(message)).unwrap();
        }

        assert_eq!(messages(&repo.recent(2).unwrap()), vec!["c", "b"]);
    }

    #[test]
    fn test_recent_since_excludes_older_entries() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let old = repo.append(entry("old")).unwrap();
        repo.conn
            .execute(
                "UPDATE log_entries SET timestamp = ? WHERE local_id = ?",
                params![old.timestamp - 60_000, old.local_id.get()],
            )
            .unwrap();
        let new = repo.append(entry("new")).unwrap();

        let recent = repo.recent_since(new.timestamp, 10).unwrap();
        assert_eq!(messages(&recent), vec!["new"]);
    }

    #[test]
    fn test_metadata_round_trips_through_storage() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let metadata = LogMetadata {
            post_data: Some(EntitySnapshot::named("Bar").with_color("blue")),
            ..LogMetadata::default()
        };
        let appended = repo
            .append(
                NewLogEntry::new(
                    EventKind::created(EntityKind::Place),
                    "store-1",
                    "user-1",
                    "Created place \"Bar\"",
                )
                .with_metadata(metadata.clone()),
            )
            .unwrap();

        let fetched = repo.get(appended.local_id).unwrap().unwrap();
        assert_eq!(fetched, appended);
        assert_eq!(fetched.metadata, Some(metadata));
    }

    #[test]
    fn test_mark_acknowledged_records_server_id_once() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let appended = repo.append(entry("a")).unwrap();
        repo.mark_acknowledged(appended.local_id, "17").unwrap();
        repo.mark_acknowledged(appended.local_id, "18").unwrap();

        let fetched = repo.get(appended.local_id).unwrap().unwrap();
        assert!(fetched.synced);
        assert_eq!(fetched.server_id.as_deref(), Some("17"));
    }

    #[test]
    fn test_clear_all_wipes_queue_and_session_marker() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        repo.append(entry("a")).unwrap();
        repo.set_session_start(Some(123)).unwrap();
        assert_eq!(repo.session_start().unwrap(), Some(123));

        assert_eq!(repo.clear_all().unwrap(), 1);
        assert!(repo.all().unwrap().is_empty());
        assert_eq!(repo.session_start().unwrap(), None);

        repo.set_session_identity(Some(("store-1", "ana"))).unwrap();
        repo.clear_all().unwrap();
        assert_eq!(repo.session_identity().unwrap(), None);

        // Ids keep increasing after a clear
        let next = repo.append(entry("b")).unwrap();
        assert!(next.local_id.get() > 1);
    }

    #[test]
    fn test_delete_by_id() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        let a = repo.append(entry("a")).unwrap();
        assert!(repo.delete_by_id(a.local_id).unwrap());
        assert!(!repo.delete_by_id(a.local_id).unwrap());
        assert!(repo.get(a.local_id).unwrap().is_none());
    }

    #[test]
    fn test_session_identity_round_trip() {
        let db = setup();
        let repo = SqliteLogQueueRepository::new(db.connection());

        assert_eq!(repo.session_identity().unwrap(), None);
        repo.set_session_identity(Some(("store-7", "ana"))).unwrap();
        assert_eq!(
            repo.session_identity().unwrap(),
            Some(("store-7".to_string(), "ana".to_string()))
        );

        repo.set_session_identity(None).unwrap();
        assert_eq!(repo.session_identity().unwrap(), None);
    }
}
