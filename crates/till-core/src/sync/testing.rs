//! Scripted in-process transport used by the sync and logging tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use super::wire::UndoReceipt;
use super::{LogTransport, SyncError, SyncResult};
use crate::models::LogEntry;

#[derive(Default)]
pub struct ScriptedTransport {
    batch_calls: AtomicUsize,
    failing_batches: HashSet<usize>,
    fail_singles: AtomicBool,
    batch_delay: Option<Duration>,
    batches: Mutex<Vec<usize>>,
    singles: Mutex<Vec<Uuid>>,
    undos: Mutex<Vec<String>>,
    next_server_id: AtomicUsize,
}

impl ScriptedTransport {
    /// Fail the n-th batch request (1-based)
    pub fn failing_batch(mut self, call: usize) -> Self {
        self.failing_batches.insert(call);
        self
    }

    pub fn failing_singles(self) -> Self {
        self.fail_singles.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_failing_singles(&self, failing: bool) {
        self.fail_singles.store(failing, Ordering::SeqCst);
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn single_sends(&self) -> Vec<Uuid> {
        self.singles.lock().unwrap().clone()
    }

    pub fn undo_requests(&self) -> Vec<String> {
        self.undos.lock().unwrap().clone()
    }
}

impl LogTransport for ScriptedTransport {
    async fn send_entry(&self, entry: &LogEntry, _timeout: Duration) -> SyncResult<Option<String>> {
        self.singles.lock().unwrap().push(entry.client_id);
        if self.fail_singles.load(Ordering::SeqCst) {
            return Err(SyncError::Api("unreachable (503)".to_string()));
        }
        let id = self.next_server_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Some(id.to_string()))
    }

    async fn send_batch(
        &self,
        entries: &[LogEntry],
        _timeout: Duration,
    ) -> SyncResult<HashMap<Uuid, String>> {
        let call = self.batch_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }
        self.batches.lock().unwrap().push(entries.len());
        if self.failing_batches.contains(&call) {
            return Err(SyncError::Api("batch rejected (500)".to_string()));
        }
        Ok(entries
            .iter()
            .map(|entry| {
                let id = self.next_server_id.fetch_add(1, Ordering::SeqCst) + 1;
                (entry.client_id, id.to_string())
            })
            .collect())
    }

    async fn request_undo(&self, server_id: &str) -> SyncResult<UndoReceipt> {
        self.undos.lock().unwrap().push(server_id.to_string());
        Ok(UndoReceipt {
            success: true,
            message: "Undo successful".to_string(),
            original_log: json!({ "id": server_id }),
        })
    }

    async fn health(&self, _timeout: Duration) -> SyncResult<()> {
        Ok(())
    }
}
