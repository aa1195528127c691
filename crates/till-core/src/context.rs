//! Explicit wiring of the client services.

use std::sync::Arc;

use crate::config::{ClientConfig, ConfigError};
use crate::logging::LoggingService;
use crate::queue::LocalLogQueue;
use crate::sync::{
    Connectivity, ConnectivityMonitor, ConnectivityProbe, HttpLogTransport, LogTransport,
    RecurringTask, SyncEngine, SyncSupervisor,
};
use crate::Result;

/// Every client service, constructed once by the application root
pub struct ClientContext<T = HttpLogTransport> {
    config: ClientConfig,
    queue: LocalLogQueue,
    connectivity: ConnectivityMonitor,
    engine: SyncEngine<T>,
    logging: LoggingService<T>,
}

impl ClientContext<HttpLogTransport> {
    /// Open the local queue and connect to the configured log server
    pub fn open(config: ClientConfig) -> Result<Self> {
        let transport = HttpLogTransport::new(config.require_api_base_url()?)?;
        let db_path = config
            .db_path
            .clone()
            .ok_or(ConfigError::MissingVar("TILL_DB_PATH"))?;
        let queue = LocalLogQueue::open(&db_path)?;
        tracing::debug!(path = %db_path.display(), "Opened local log queue");

        Ok(Self::with_parts(
            config,
            queue,
            Arc::new(transport),
            ConnectivityMonitor::new(Connectivity::Offline),
        ))
    }
}

impl<T: LogTransport> ClientContext<T> {
    pub fn with_parts(
        config: ClientConfig,
        queue: LocalLogQueue,
        transport: Arc<T>,
        connectivity: ConnectivityMonitor,
    ) -> Self {
        let engine = SyncEngine::new(
            queue.clone(),
            transport,
            connectivity.clone(),
            config.sync_settings(),
        );
        let logging = LoggingService::new(queue.clone(), engine.clone(), config.recent_limit);
        Self {
            config,
            queue,
            connectivity,
            engine,
            logging,
        }
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub const fn queue(&self) -> &LocalLogQueue {
        &self.queue
    }

    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub const fn engine(&self) -> &SyncEngine<T> {
        &self.engine
    }

    pub const fn logging(&self) -> &LoggingService<T> {
        &self.logging
    }

    /// Probe connectivity once, right now
    pub async fn check_connectivity(&self) -> bool {
        let online = self
            .engine
            .transport()
            .health(self.config.immediate_timeout)
            .await
            .is_ok();
        self.connectivity.set_online(online);
        online
    }

    /// Start the connectivity probe and the connectivity-driven batch sync
    pub fn spawn_background_sync(&self) -> BackgroundSync {
        let probe = ConnectivityProbe::spawn(
            self.connectivity.clone(),
            Arc::clone(self.engine.transport()),
            self.config.probe_interval,
            self.config.immediate_timeout,
        );

        let logging = self.logging.clone();
        let supervisor = SyncSupervisor::spawn(&self.connectivity, self.config.sync_interval, move || {
            let logging = logging.clone();
            async move {
                logging.sync_now().await;
            }
        });

        BackgroundSync { probe, supervisor }
    }
}

/// Running background sync; stop it to let in-flight work finish
pub struct BackgroundSync {
    probe: RecurringTask,
    supervisor: SyncSupervisor,
}

impl BackgroundSync {
    pub async fn stop(self) {
        self.probe.stop().await;
        self.supervisor.shutdown().await;
    }
}
