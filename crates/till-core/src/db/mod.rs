//! Database layer for the local activity log

mod connection;
mod log_repository;
mod migrations;

pub use connection::Database;
pub use log_repository::{LogQueueRepository, SqliteLogQueueRepository};
