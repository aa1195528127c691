use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::sync::{watch, RwLock};

use super::{format_message, LogContext};
use crate::models::{EntityKind, EntitySnapshot, EventKind, LogEntry, LogId, LogMetadata, NewLogEntry};
use crate::queue::LocalLogQueue;
use crate::sync::wire::UndoReceipt;
use crate::sync::{LogTransport, SyncEngine, SyncReport};
use crate::util::unix_millis_now;
use crate::{Error, Result};

const ANONYMOUS_SCOPE: &str = "unknown";
const ANONYMOUS_ACTOR: &str = "anonymous";

/// Store and user every entry of the current session is stamped with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub scope: String,
    pub actor: String,
}

impl Identity {
    pub fn new(scope: impl Into<String>, actor: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            actor: actor.into(),
        }
    }

    fn anonymous() -> Self {
        Self::new(ANONYMOUS_SCOPE, ANONYMOUS_ACTOR)
    }
}

/// Records activity log entries and keeps live views up to date.
///
/// Recording never fails towards the caller: storage problems are traced and,
/// where possible, turned into an `error` entry.
pub struct LoggingService<T> {
    queue: LocalLogQueue,
    engine: SyncEngine<T>,
    identity: Arc<RwLock<Option<Identity>>>,
    /// Set while consecutive sync runs keep failing
    sync_failing: Arc<AtomicBool>,
    recent_limit: usize,
    recent: Arc<watch::Sender<Arc<Vec<LogEntry>>>>,
}

impl<T> Clone for LoggingService<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            engine: self.engine.clone(),
            identity: Arc::clone(&self.identity),
            sync_failing: Arc::clone(&self.sync_failing),
            recent_limit: self.recent_limit,
            recent: Arc::clone(&self.recent),
        }
    }
}

impl<T: LogTransport> LoggingService<T> {
    pub fn new(queue: LocalLogQueue, engine: SyncEngine<T>, recent_limit: usize) -> Self {
        let (recent, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            queue,
            engine,
            identity: Arc::new(RwLock::new(None)),
            sync_failing: Arc::new(AtomicBool::new(false)),
            recent_limit: recent_limit.max(1),
            recent: Arc::new(recent),
        }
    }

    pub const fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.identity.read().await.clone()
    }

    /// Load the identity of a session that outlived the process
    pub async fn restore_session(&self) -> Result<Option<Identity>> {
        let identity = self
            .queue
            .session_identity()
            .await?
            .map(|(scope, actor)| Identity::new(scope, actor));
        (*self.identity.write().await).clone_from(&identity);
        self.notify().await;
        Ok(identity)
    }

    /// Live view of `recent_logs`, refreshed after every change
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<LogEntry>>> {
        self.recent.subscribe()
    }

    /// Format, append and try to deliver one entry.
    ///
    /// An empty `template`, or one that renders to nothing, falls back to the
    /// kind's default template.
    pub async fn log(&self, kind: EventKind, template: &str, context: LogContext) -> Option<LogEntry> {
        let default_template = kind.template_for(context.count.is_some());
        let mut message = if template.trim().is_empty() {
            String::new()
        } else {
            format_message(template, &context)
        };
        if message.is_empty() {
            message = format_message(&default_template, &context);
        }
        if message.is_empty() {
            message = kind.to_string();
        }
        let identity = self.identity().await.unwrap_or_else(Identity::anonymous);

        let entry = NewLogEntry::new(kind, identity.scope, identity.actor, message)
            .with_metadata(context.metadata);
        let entry = match self.queue.append(entry).await {
            Ok(entry) => entry,
            Err(error) => {
                tracing::warn!(%kind, "Failed to record log entry: {error}");
                self.record_error(kind, &error).await;
                self.notify().await;
                return None;
            }
        };
        tracing::debug!(id = %entry.local_id, %kind, "Recorded log entry");

        let entry = if self.engine.send_immediately(&entry).await {
            // Pick up the synced flag and server id
            match self.queue.get(entry.local_id).await {
                Ok(Some(stored)) => stored,
                Ok(None) => entry,
                Err(error) => {
                    tracing::warn!(id = %entry.local_id, "Failed to reload log entry: {error}");
                    LogEntry {
                        synced: true,
                        ..entry
                    }
                }
            }
        } else {
            entry
        };
        self.notify().await;
        Some(entry)
    }

    async fn record_error(&self, kind: EventKind, error: &Error) {
        let identity = self.identity().await.unwrap_or_else(Identity::anonymous);
        let entry = NewLogEntry::new(
            EventKind::Error,
            identity.scope,
            identity.actor,
            format!("Failed to record {kind}: {error}"),
        );
        if let Err(error) = self.queue.append(entry).await {
            tracing::warn!("Failed to record error entry: {error}");
        }
    }

    async fn notify(&self) {
        match self.recent_logs().await {
            Ok(entries) => {
                self.recent.send_replace(Arc::new(entries));
            }
            Err(error) => tracing::warn!("Failed to refresh recent logs: {error}"),
        }
    }

    /// Entries of the current session, most recent first
    pub async fn recent_logs(&self) -> Result<Vec<LogEntry>> {
        match self.queue.session_start().await? {
            Some(since) => self.queue.recent_since(since, self.recent_limit).await,
            None => self.queue.recent(self.recent_limit).await,
        }
    }

    /// Full local history, ignoring the session boundary
    pub async fn all_logs(&self) -> Result<Vec<LogEntry>> {
        self.queue.all().await
    }

    pub async fn navigation(&self, destination: &str) -> Option<LogEntry> {
        self.log(EventKind::Navigation, "", LogContext::named(destination))
            .await
    }

    pub async fn signed_in(&self, identity: Identity) -> Option<LogEntry> {
        self.start_session(EventKind::SignIn, identity).await
    }

    pub async fn signed_up(&self, identity: Identity) -> Option<LogEntry> {
        self.start_session(EventKind::SignUp, identity).await
    }

    async fn start_session(&self, kind: EventKind, identity: Identity) -> Option<LogEntry> {
        if let Err(error) = self.queue.clear_all().await {
            tracing::warn!("Failed to reset local log queue: {error}");
        }
        if let Err(error) = self.queue.set_session_start(Some(unix_millis_now())).await {
            tracing::warn!("Failed to stamp session start: {error}");
        }
        if let Err(error) = self
            .queue
            .set_session_identity(Some((&identity.scope, &identity.actor)))
            .await
        {
            tracing::warn!("Failed to persist session identity: {error}");
        }
        let actor = identity.actor.clone();
        *self.identity.write().await = Some(identity);
        self.log(kind, "", LogContext::named(actor)).await
    }

    pub async fn signed_out(&self) -> Option<LogEntry> {
        let actor = self.identity().await.map(|identity| identity.actor);
        let entry = self
            .log(
                EventKind::SignOut,
                "",
                LogContext::named(actor.unwrap_or_else(|| ANONYMOUS_ACTOR.to_string())),
            )
            .await;

        if let Err(error) = self.queue.set_session_start(None).await {
            tracing::warn!("Failed to clear session start: {error}");
        }
        if let Err(error) = self.queue.set_session_identity(None).await {
            tracing::warn!("Failed to clear session identity: {error}");
        }
        *self.identity.write().await = None;
        self.notify().await;
        entry
    }

    pub async fn error(&self, message: &str) -> Option<LogEntry> {
        self.log(EventKind::Error, "", LogContext::named(message)).await
    }

    pub async fn entity_created(&self, kind: EntityKind, post: EntitySnapshot) -> Option<LogEntry> {
        let post = self.stamp(post).await;
        let context = entity_context(kind, &post).with_metadata(LogMetadata {
            post_data: Some(post),
            ..LogMetadata::default()
        });
        self.log(EventKind::created(kind), "", context).await
    }

    pub async fn entity_updated(
        &self,
        kind: EntityKind,
        pre: EntitySnapshot,
        post: EntitySnapshot,
    ) -> Option<LogEntry> {
        let pre = self.stamp(pre).await;
        let post = self.stamp(post).await;
        let context = entity_context(kind, &post).with_metadata(LogMetadata {
            pre_data: Some(pre),
            post_data: Some(post),
            additional_data: None,
        });
        self.log(EventKind::updated(kind), "", context).await
    }

    pub async fn entity_deleted(&self, kind: EntityKind, pre: EntitySnapshot) -> Option<LogEntry> {
        let pre = self.stamp(pre).await;
        let context = entity_context(kind, &pre).with_metadata(LogMetadata {
            pre_data: Some(pre),
            ..LogMetadata::default()
        });
        self.log(EventKind::deleted(kind), "", context).await
    }

    pub async fn entities_reordered(&self, kind: EntityKind, names: &[String]) -> Option<LogEntry> {
        let count = i64::try_from(names.len()).unwrap_or(i64::MAX);
        let context = LogContext::default()
            .with_count(count, kind.as_str())
            .with_metadata(LogMetadata {
                additional_data: Some(json!({ "order": names })),
                ..LogMetadata::default()
            });
        self.log(EventKind::reordered(kind), "", context).await
    }

    /// Fill scope and actor the snapshot lacks from the active identity
    async fn stamp(&self, mut snapshot: EntitySnapshot) -> EntitySnapshot {
        if let Some(identity) = self.identity().await {
            snapshot.scope.get_or_insert(identity.scope);
            snapshot.actor.get_or_insert(identity.actor);
        }
        snapshot
    }

    /// Run one batch sync and record sync status on streak transitions.
    ///
    /// Only the first failure of a streak and the recovery after it are
    /// logged, so status entries cannot keep the queue busy on their own.
    pub async fn sync_now(&self) -> SyncReport {
        let report = self.engine.sync_pending_logs().await;
        if report.skipped {
            return report;
        }

        if report.success {
            if self.sync_failing.swap(false, Ordering::SeqCst) {
                let count = i64::try_from(report.synced_count).unwrap_or(i64::MAX);
                self.log(
                    EventKind::SyncCompleted,
                    "",
                    LogContext::default().with_count(count, "entry"),
                )
                .await;
            }
        } else if !self.sync_failing.swap(true, Ordering::SeqCst) {
            self.log(
                EventKind::SyncFailed,
                "",
                LogContext::named(report.errors.join("; ")),
            )
            .await;
        }

        self.notify().await;
        report
    }

    /// Ask the server to reverse the mutation recorded by a local entry
    pub async fn request_undo(&self, local_id: LogId) -> Result<UndoReceipt> {
        let entry = self
            .queue
            .get(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(local_id.to_string()))?;

        if !entry
            .kind
            .entity_mutation()
            .is_some_and(|(kind, _)| kind.supports_undo())
        {
            return Err(Error::InvalidInput(format!(
                "undo not supported for {} entries",
                entry.kind
            )));
        }
        let server_id = entry.server_id.as_deref().ok_or_else(|| {
            Error::InvalidInput(format!(
                "log entry {local_id} has not been acknowledged by the server yet"
            ))
        })?;

        let receipt = self.engine.transport().request_undo(server_id).await?;
        tracing::info!(%local_id, server_id, "Undo requested");
        Ok(receipt)
    }
}

fn entity_context(kind: EntityKind, snapshot: &EntitySnapshot) -> LogContext {
    let context = LogContext::named(snapshot.name().unwrap_or_default());
    match snapshot.count {
        Some(count) => context.with_count(count, kind.count_noun()),
        None => context,
    }
}
