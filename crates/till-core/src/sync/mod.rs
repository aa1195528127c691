//! Delivery of the local activity log to the log server.
//!
//! Entries are pushed once right after they are appended and then retried in
//! bounded batches on a recurring schedule while the host is online.

mod connectivity;
mod engine;
mod scheduler;
#[cfg(test)]
pub(crate) mod testing;
mod transport;
pub mod wire;

use thiserror::Error;

pub use connectivity::{Connectivity, ConnectivityMonitor, ConnectivityProbe};
pub use engine::{
    SyncCursor, SyncEngine, SyncReport, SyncSettings, DEFAULT_BATCH_SIZE, DEFAULT_BATCH_TIMEOUT,
    DEFAULT_IMMEDIATE_TIMEOUT,
};
pub use scheduler::{RecurringTask, SyncSupervisor};
pub use transport::{HttpLogTransport, LogTransport};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Invalid sync configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Log server HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Log server API error: {0}")]
    Api(String),
    #[error("Invalid log server payload: {0}")]
    InvalidPayload(String),
    #[error("Host is offline")]
    Offline,
}

pub type SyncResult<T> = Result<T, SyncError>;
