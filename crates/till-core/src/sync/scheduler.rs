//! Recurring background work driven by connectivity.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Connectivity, ConnectivityMonitor};

/// Handle to a job that runs immediately and then every `period`.
///
/// Cancelling (or dropping the handle) stops scheduling further runs; a run
/// that already started is left to finish.
pub struct RecurringTask {
    name: &'static str,
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RecurringTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, mut cancelled) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(task = name, ?period, "Recurring task started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = interval.tick() => {}
                }
                if *cancelled.borrow() {
                    break;
                }
                job().await;
            }

            tracing::debug!(task = name, "Recurring task stopped");
        });

        Self {
            name,
            cancel,
            handle,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Stop scheduling new runs
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait until the loop, including any in-flight run, has ended
    pub async fn stop(self) {
        self.cancel();
        if let Err(error) = self.handle.await {
            tracing::warn!(task = self.name, "Recurring task ended abnormally: {error}");
        }
    }
}

/// Starts the recurring sync task whenever the host comes online and cancels
/// it when the host goes offline.
pub struct SyncSupervisor {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncSupervisor {
    pub fn spawn<F, Fut>(monitor: &ConnectivityMonitor, period: Duration, job: F) -> Self
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let mut connectivity = monitor.subscribe();

        let handle = tokio::spawn(async move {
            let mut task: Option<RecurringTask> = None;
            let mut state = *connectivity.borrow_and_update();

            loop {
                match state {
                    Connectivity::Online => {
                        // Starting is idempotent while a task is alive
                        if task.as_ref().is_none_or(RecurringTask::is_finished) {
                            task = Some(RecurringTask::spawn("batch-sync", period, job.clone()));
                        }
                    }
                    Connectivity::Offline => {
                        if let Some(running) = task.take() {
                            running.cancel();
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    changed = connectivity.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        state = *connectivity.borrow_and_update();
                    }
                }
            }

            if let Some(running) = task.take() {
                running.stop().await;
            }
        });

        Self { shutdown, handle }
    }

    /// Stop supervising and wait for the recurring task to wind down
    pub async fn shutdown(self) {
        self.shutdown.send_replace(true);
        if let Err(error) = self.handle.await {
            tracing::warn!("Sync supervisor ended abnormally: {error}");
        }
    }
}
