//! till-core - Core library for Till
//!
//! This crate contains the activity log models, the local log queue, the
//! connectivity-aware sync engine and the logging service used by every Till
//! client (CLI, back-office UI shells).

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod queue;
pub mod sync;
pub mod util;

pub use context::ClientContext;
pub use error::{Error, Result};
pub use models::{EntityKind, EventKind, LogEntry, LogId};
