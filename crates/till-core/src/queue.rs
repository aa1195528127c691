//! Local log queue shared by the logging service and the sync engine.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LogQueueRepository, SqliteLogQueueRepository};
use crate::models::{LogEntry, LogId, NewLogEntry};
use crate::Result;

/// Durable, append-only local store of log entries.
///
/// Every operation takes the same lock, so callers never observe a
/// partially applied append and the queue has a single logical writer.
#[derive(Clone)]
pub struct LocalLogQueue {
    db: Arc<Mutex<Database>>,
}

impl LocalLogQueue {
    /// Open the queue at the given filesystem path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self::from_database(Database::open(db_path)?))
    }

    /// Open an in-memory queue (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Append an entry; it starts unsynced.
    pub async fn append(&self, entry: NewLogEntry) -> Result<LogEntry> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).append(entry)
    }

    /// Fetch an entry by local id.
    pub async fn get(&self, id: LogId) -> Result<Option<LogEntry>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).get(id)
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).recent(limit)
    }

    /// Most recent entries first, dropping entries older than `since`.
    pub async fn recent_since(&self, since: i64, limit: usize) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).recent_since(since, limit)
    }

    /// Full local history, most recent first.
    pub async fn all(&self) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).all()
    }

    /// Pending entries in append order.
    pub async fn unsynced(&self) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).unsynced()
    }

    pub async fn pending_count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).pending_count()
    }

    /// Mark entries synced. Safe to call repeatedly for the same ids.
    pub async fn mark_synced(&self, ids: &[LogId]) -> Result<usize> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).mark_synced(ids)
    }

    pub async fn mark_acknowledged(&self, id: LogId, server_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).mark_acknowledged(id, server_id)
    }

    pub async fn delete_by_id(&self, id: LogId) -> Result<bool> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).delete_by_id(id)
    }

    /// Wipe every entry and all session state.
    pub async fn clear_all(&self) -> Result<usize> {
        let db = self.db.lock().await;
        let removed = SqliteLogQueueRepository::new(db.connection()).clear_all()?;
        tracing::info!(removed, "Cleared local log queue");
        Ok(removed)
    }

    pub async fn session_start(&self) -> Result<Option<i64>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).session_start()
    }

    pub async fn set_session_start(&self, at: Option<i64>) -> Result<()> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).set_session_start(at)
    }

    pub async fn session_identity(&self) -> Result<Option<(String, String)>> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).session_identity()
    }

    pub async fn set_session_identity(&self, identity: Option<(&str, &str)>) -> Result<()> {
        let db = self.db.lock().await;
        SqliteLogQueueRepository::new(db.connection()).set_session_identity(identity)
    }

    /// Run raw SQL against the queue database
    #[cfg(test)]
    pub(crate) async fn execute_sql(&self, sql: &str) -> Result<()> {
        let db = self.db.lock().await;
        db.connection().execute_batch(sql)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKind;

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_appends_get_distinct_ordered_ids() {
        let queue = LocalLogQueue::open_in_memory().unwrap();

        let mut handles = Vec::new();
        for index in 0..20 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .append(NewLogEntry::new(
                        EventKind::Navigation,
                        "store-1",
                        "user-1",
                        format!("entry {index}"),
                    ))
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let unsynced = queue.unsynced().await.unwrap();
        assert_eq!(unsynced.len(), 20);
        assert!(unsynced
            .windows(2)
            .all(|pair| pair[0].local_id < pair[1].local_id
                && pair[0].timestamp <= pair[1].timestamp));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_creates_parent_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("till.db");
        let queue = LocalLogQueue::open(&path).unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 0);
        assert!(path.exists());
    }
}
