//! Server-side `SQLite` storage: the log table and the entity collaborator.

mod entities;
mod logs;
mod migrations;

use std::path::Path;

use rusqlite::Connection;

pub use entities::{EntityFields, EntityStore, SqliteEntityStore};
pub use logs::{BatchOutcome, LogStore, NewServerLog, ServerLog, SqliteLogStore};

/// Owns the server connection; callers serialise access behind a mutex
pub struct ServerDb {
    conn: Connection,
}

impl ServerDb {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        let db = Self::configure(conn)?;
        tracing::info!("Opened server database at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::configure(Connection::open_in_memory()?)
    }

    fn configure(conn: Connection) -> rusqlite::Result<Self> {
        // In-memory databases stay in `memory` journal mode
        conn.execute_batch("PRAGMA journal_mode = WAL;").ok();
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        migrations::run(&conn)?;
        Ok(Self { conn })
    }

    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}
