use std::io;

use thiserror::Error;
use till_core::config::ConfigError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] till_core::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Store identifier cannot be empty")]
    EmptyStore,
    #[error("User identifier cannot be empty")]
    EmptyUser,
    #[error("Entity name cannot be empty")]
    EmptyName,
    #[error("Navigation destination cannot be empty")]
    EmptyDestination,
    #[error("Invalid log entry id: {0}")]
    InvalidLogId(String),
    #[error("The local log could not record the event; see `till recent` for the error entry")]
    NotRecorded,
    #[error("Undo rejected: {0}")]
    UndoRejected(String),
}
