//! Immediate and batched delivery of pending log entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::{ConnectivityMonitor, LogTransport};
use crate::models::{LogEntry, LogId};
use crate::queue::LocalLogQueue;
use crate::util::unix_millis_now;
use crate::Result;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_IMMEDIATE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_BATCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Maximum entries per batch request
    pub batch_size: usize,
    pub immediate_timeout: Duration,
    pub batch_timeout: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            immediate_timeout: DEFAULT_IMMEDIATE_TIMEOUT,
            batch_timeout: DEFAULT_BATCH_TIMEOUT,
        }
    }
}

/// Outcome of one batch sync run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// True only when every batch of the run was accepted
    pub success: bool,
    pub synced_count: usize,
    pub errors: Vec<String>,
    /// The run was a no-op because another run was in flight
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            errors: vec![error.into()],
            ..Self::default()
        }
    }
}

/// Derived view of sync progress; never authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCursor {
    pub last_sync_time: Option<i64>,
    pub pending_count: usize,
}

/// Pushes unsynced entries from the local queue to the log server.
///
/// Delivery is at-least-once: an entry can be sent again when an
/// acknowledgement is lost, and marking an entry synced twice is harmless.
pub struct SyncEngine<T> {
    queue: LocalLogQueue,
    transport: Arc<T>,
    connectivity: ConnectivityMonitor,
    settings: SyncSettings,
    in_flight: Arc<AtomicBool>,
    /// Unix ms of the last fully successful run, 0 when none
    last_sync: Arc<AtomicI64>,
}

impl<T> Clone for SyncEngine<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            transport: Arc::clone(&self.transport),
            connectivity: self.connectivity.clone(),
            settings: self.settings,
            in_flight: Arc::clone(&self.in_flight),
            last_sync: Arc::clone(&self.last_sync),
        }
    }
}

impl<T: LogTransport> SyncEngine<T> {
    pub fn new(
        queue: LocalLogQueue,
        transport: Arc<T>,
        connectivity: ConnectivityMonitor,
        settings: SyncSettings,
    ) -> Self {
        Self {
            queue,
            transport,
            connectivity,
            settings: SyncSettings {
                batch_size: settings.batch_size.max(1),
                ..settings
            },
            in_flight: Arc::new(AtomicBool::new(false)),
            last_sync: Arc::new(AtomicI64::new(0)),
        }
    }

    pub const fn settings(&self) -> SyncSettings {
        self.settings
    }

    pub const fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Single delivery attempt for a freshly appended entry.
    ///
    /// Returns whether the entry is now synced. A failure leaves the entry
    /// pending for the next batch run; there is no local retry.
    pub async fn send_immediately(&self, entry: &LogEntry) -> bool {
        if !self.connectivity.is_online() {
            tracing::debug!(id = %entry.local_id, "Offline, leaving entry pending");
            return false;
        }

        let server_id = match self
            .transport
            .send_entry(entry, self.settings.immediate_timeout)
            .await
        {
            Ok(server_id) => server_id,
            Err(error) => {
                tracing::debug!(id = %entry.local_id, "Immediate send failed: {error}");
                return false;
            }
        };

        let marked = match server_id {
            Some(server_id) => self
                .queue
                .mark_acknowledged(entry.local_id, &server_id)
                .await,
            None => self.queue.mark_synced(&[entry.local_id]).await.map(|_| ()),
        };
        if let Err(error) = marked {
            tracing::warn!(id = %entry.local_id, "Failed to mark entry synced: {error}");
            return false;
        }
        true
    }

    /// Push every pending entry in bounded batches, oldest first.
    ///
    /// A failed batch is left pending and the run moves on to the next one.
    pub async fn sync_pending_logs(&self) -> SyncReport {
        if !self.connectivity.is_online() {
            return SyncReport::failed("offline");
        }
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Sync already in flight, skipping");
            return SyncReport::skipped();
        };

        let pending = match self.queue.unsynced().await {
            Ok(pending) => pending,
            Err(error) => {
                tracing::warn!("Failed to load pending entries: {error}");
                return SyncReport::failed(format!("load pending entries: {error}"));
            }
        };

        let mut report = SyncReport::default();
        for (index, batch) in pending.chunks(self.settings.batch_size).enumerate() {
            let number = index + 1;
            let server_ids = match self
                .transport
                .send_batch(batch, self.settings.batch_timeout)
                .await
            {
                Ok(server_ids) => server_ids,
                Err(error) => {
                    tracing::warn!(batch = number, size = batch.len(), "Batch sync failed: {error}");
                    report.errors.push(format!("batch {number}: {error}"));
                    continue;
                }
            };

            match self.mark_batch(batch, &server_ids).await {
                Ok(()) => report.synced_count += batch.len(),
                Err(error) => report
                    .errors
                    .push(format!("batch {number}: mark synced: {error}")),
            }
        }

        report.success = report.errors.is_empty();
        if report.success {
            self.last_sync.store(unix_millis_now(), Ordering::SeqCst);
        }
        if !pending.is_empty() {
            tracing::info!(
                pending = pending.len(),
                synced = report.synced_count,
                failed_batches = report.errors.len(),
                "Batch sync finished"
            );
        }
        report
    }

    async fn mark_batch(&self, batch: &[LogEntry], server_ids: &HashMap<Uuid, String>) -> Result<()> {
        let ids: Vec<LogId> = batch.iter().map(|entry| entry.local_id).collect();
        self.queue.mark_synced(&ids).await?;
        for entry in batch {
            if let Some(server_id) = server_ids.get(&entry.client_id) {
                self.queue.mark_acknowledged(entry.local_id, server_id).await?;
            }
        }
        Ok(())
    }

    pub fn last_sync_time(&self) -> Option<i64> {
        match self.last_sync.load(Ordering::SeqCst) {
            0 => None,
            at => Some(at),
        }
    }

    pub async fn cursor(&self) -> Result<SyncCursor> {
        Ok(SyncCursor {
            last_sync_time: self.last_sync_time(),
            pending_count: self.queue.pending_count().await?,
        })
    }
}

/// Holds the in-flight flag for the duration of one batch run
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventKind, NewLogEntry};
    use crate::sync::testing::ScriptedTransport;
    use crate::sync::Connectivity;
    use pretty_assertions::assert_eq;

    fn engine(transport: ScriptedTransport, online: bool) -> SyncEngine<ScriptedTransport> {
        let connectivity = ConnectivityMonitor::new(if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        });
        SyncEngine::new(
            LocalLogQueue::open_in_memory().unwrap(),
            Arc::new(transport),
            connectivity,
            SyncSettings::default(),
        )
    }

    async fn append(engine: &SyncEngine<ScriptedTransport>, count: usize) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        for index in 0..count {
            let entry = engine
                .queue
                .append(NewLogEntry::new(
                    EventKind::Navigation,
                    "store-1",
                    "user-1",
                    format!("Visited page {index}"),
                ))
                .await
                .unwrap();
            entries.push(entry);
        }
        entries
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn second_batch_failure_leaves_its_entries_pending() {
        let engine = engine(ScriptedTransport::default().failing_batch(2), true);
        let entries = append(&engine, 12).await;

        let report = engine.sync_pending_logs().await;

        assert_eq!(engine.transport().batch_sizes(), vec![10, 2]);
        assert!(!report.success);
        assert_eq!(report.synced_count, 10);
        assert_eq!(report.errors.len(), 1);

        let pending: Vec<LogId> = engine
            .queue
            .unsynced()
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.local_id)
            .collect();
        let expected: Vec<LogId> = entries[10..].iter().map(|entry| entry.local_id).collect();
        assert_eq!(pending, expected);
        assert_eq!(engine.last_sync_time(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn successful_sync_marks_everything_and_keeps_history() {
        let engine = engine(ScriptedTransport::default(), true);
        append(&engine, 3).await;

        let report = engine.sync_pending_logs().await;
        assert!(report.success);
        assert_eq!(report.synced_count, 3);

        assert!(engine.queue.unsynced().await.unwrap().is_empty());
        let all = engine.queue.all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|entry| entry.synced));
        assert!(all.iter().all(|entry| entry.server_id.is_some()));

        let cursor = engine.cursor().await.unwrap();
        assert_eq!(cursor.pending_count, 0);
        assert!(cursor.last_sync_time.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_sync_sends_nothing() {
        let engine = engine(ScriptedTransport::default(), false);
        append(&engine, 2).await;

        let report = engine.sync_pending_logs().await;
        assert!(!report.success);
        assert_eq!(report.errors, vec!["offline".to_string()]);
        assert!(engine.transport().batch_sizes().is_empty());
        assert_eq!(engine.queue.pending_count().await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn overlapping_run_is_skipped() {
        let engine = engine(
            ScriptedTransport::default().with_batch_delay(Duration::from_millis(150)),
            true,
        );
        append(&engine, 1).await;

        let first = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.sync_pending_logs().await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        let second = engine.sync_pending_logs().await;

        assert!(second.skipped);
        let first = first.await.unwrap();
        assert!(first.success);
        assert_eq!(engine.transport().batch_sizes(), vec![1]);

        // The guard is released once the first run finishes
        let third = engine.sync_pending_logs().await;
        assert!(!third.skipped);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn immediate_send_records_server_id() {
        let engine = engine(ScriptedTransport::default(), true);
        let entry = append(&engine, 1).await.remove(0);

        assert!(engine.send_immediately(&entry).await);

        let stored = engine.queue.get(entry.local_id).await.unwrap().unwrap();
        assert!(stored.synced);
        assert_eq!(stored.server_id.as_deref(), Some("1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_immediate_send_leaves_entry_pending() {
        let engine = engine(ScriptedTransport::default().failing_singles(), true);
        let entry = append(&engine, 1).await.remove(0);

        assert!(!engine.send_immediately(&entry).await);
        assert_eq!(engine.queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn immediate_send_is_skipped_offline() {
        let engine = engine(ScriptedTransport::default(), false);
        let entry = append(&engine, 1).await.remove(0);

        assert!(!engine.send_immediately(&entry).await);
        assert!(engine.transport().single_sends().is_empty());
    }
}
