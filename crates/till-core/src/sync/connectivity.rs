//! Host connectivity tracking.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::{LogTransport, RecurringTask};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Online,
    Offline,
}

/// Online/offline state of the host, published to any number of watchers.
///
/// Transitions are not debounced; every change is delivered.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn state(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.state() == Connectivity::Online
    }

    /// Feed a host connectivity signal; returns whether the state changed
    pub fn set_online(&self, online: bool) -> bool {
        let next = if online {
            Connectivity::Online
        } else {
            Connectivity::Offline
        };
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            tracing::info!(state = ?next, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(Connectivity::Offline)
    }
}

/// Derives connectivity from periodic health checks against the log server,
/// for hosts without a native connectivity event source.
pub struct ConnectivityProbe;

impl ConnectivityProbe {
    pub fn spawn<T: LogTransport>(
        monitor: ConnectivityMonitor,
        transport: Arc<T>,
        period: Duration,
        timeout: Duration,
    ) -> RecurringTask {
        RecurringTask::spawn("connectivity-probe", period, move || {
            let monitor = monitor.clone();
            let transport = Arc::clone(&transport);
            async move {
                let online = match transport.health(timeout).await {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::debug!("Health check failed: {error}");
                        false
                    }
                };
                monitor.set_online(online);
            }
        })
    }
}
