use rusqlite::Connection;

const MIGRATIONS: &[&[&str]] = &[
    // 1: logs and entities
    &[
        "CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            client_id TEXT UNIQUE,
            kind TEXT NOT NULL,
            message TEXT NOT NULL,
            actor TEXT NOT NULL,
            scope TEXT NOT NULL,
            metadata TEXT,
            timestamp INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_logs_scope ON logs(scope, timestamp DESC)",
        "CREATE INDEX IF NOT EXISTS idx_logs_kind ON logs(kind, timestamp DESC)",
        "CREATE TABLE IF NOT EXISTS entities (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT,
            count INTEGER NOT NULL DEFAULT 0,
            scope TEXT NOT NULL,
            actor TEXT,
            sort_order INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_entities_lookup ON entities(kind, scope, name)",
    ],
];

/// Bring the schema up to date using `PRAGMA user_version` as the marker
pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    let current: usize = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    for (index, statements) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        let tx = conn.unchecked_transaction()?;
        for statement in *statements {
            tx.execute(statement, [])?;
        }
        tx.pragma_update(None, "user_version", version)?;
        tx.commit()?;
        tracing::info!("Migrated server database to version {version}");
    }
    Ok(())
}
