//! Logging façade: event taxonomy, message formatting and session scoping
//! on top of the local queue and the sync engine.

mod format;
mod service;

pub use format::{format_message, pluralize, LogContext};
pub use service::{Identity, LoggingService};
