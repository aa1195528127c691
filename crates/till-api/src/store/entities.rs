use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use till_core::models::{EntityKind, EntitySnapshot};

const ENTITY_COLUMNS: &str = "id, name, color, count, scope, actor, sort_order";

/// Field overwrites for `EntityStore::update`; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityFields {
    pub name: Option<String>,
    pub color: Option<String>,
    pub count: Option<i64>,
    pub scope: Option<String>,
}

/// Persistence of places, tables, categories and menus.
///
/// Sort order is a dense 1..N sequence per kind and scope.
pub trait EntityStore {
    fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        scope: &str,
    ) -> rusqlite::Result<Option<EntitySnapshot>>;

    fn find_by_id(&self, kind: EntityKind, id: i64) -> rusqlite::Result<Option<EntitySnapshot>>;

    /// Insert at `sort_order` when given, else at the end
    fn create(&self, kind: EntityKind, snapshot: &EntitySnapshot) -> rusqlite::Result<EntitySnapshot>;

    fn update(&self, kind: EntityKind, id: i64, fields: &EntityFields) -> rusqlite::Result<bool>;

    fn delete_by_name(&self, kind: EntityKind, name: &str, scope: &str) -> rusqlite::Result<bool>;

    fn delete_by_id(&self, kind: EntityKind, id: i64) -> rusqlite::Result<bool>;

    /// Reassign 1..N in the given name order; unnamed entities keep their
    /// relative order after the named ones
    fn reorder(&self, kind: EntityKind, scope: &str, names: &[String]) -> rusqlite::Result<()>;

    /// Entities of a scope in sort order
    fn list(&self, kind: EntityKind, scope: &str) -> rusqlite::Result<Vec<EntitySnapshot>>;
}

pub struct SqliteEntityStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityStore<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entity(row: &Row<'_>) -> rusqlite::Result<EntitySnapshot> {
        Ok(EntitySnapshot {
            id: row.get(0)?,
            name: row.get(1)?,
            color: row.get(2)?,
            count: row.get(3)?,
            scope: row.get(4)?,
            actor: row.get(5)?,
            sort_order: row.get(6)?,
        })
    }

    fn scope_of(&self, kind: EntityKind, id: i64) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT scope FROM entities WHERE kind = ? AND id = ?",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()
    }

    /// Rewrite sort order as 1..N following `ordered_ids`
    fn assign_order(&self, ordered_ids: &[i64]) -> rusqlite::Result<()> {
        let mut stmt = self
            .conn
            .prepare("UPDATE entities SET sort_order = ? WHERE id = ?")?;
        for (position, id) in (1_i64..).zip(ordered_ids) {
            stmt.execute(params![position, id])?;
        }
        Ok(())
    }

    fn renumber(&self, kind: EntityKind, scope: &str) -> rusqlite::Result<()> {
        let ids: Vec<i64> = self
            .list(kind, scope)?
            .into_iter()
            .filter_map(|entity| entity.id)
            .collect();
        self.assign_order(&ids)
    }
}

impl EntityStore for SqliteEntityStore<'_> {
    fn find_by_name(
        &self,
        kind: EntityKind,
        name: &str,
        scope: &str,
    ) -> rusqlite::Result<Option<EntitySnapshot>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ENTITY_COLUMNS} FROM entities
                     WHERE kind = ? AND scope = ? AND name = ?
                     ORDER BY id LIMIT 1"
                ),
                params![kind.as_str(), scope, name.trim()],
                Self::parse_entity,
            )
            .optional()
    }

    fn find_by_id(&self, kind: EntityKind, id: i64) -> rusqlite::Result<Option<EntitySnapshot>> {
        self.conn
            .query_row(
                &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE kind = ? AND id = ?"),
                params![kind.as_str(), id],
                Self::parse_entity,
            )
            .optional()
    }

    fn create(&self, kind: EntityKind, snapshot: &EntitySnapshot) -> rusqlite::Result<EntitySnapshot> {
        let scope = snapshot.scope.as_deref().unwrap_or_default();
        // Park the row past the end, then move it into place
        let end: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM entities WHERE kind = ? AND scope = ?",
            params![kind.as_str(), scope],
            |row| row.get(0),
        )?;
        self.conn.execute(
            "INSERT INTO entities (kind, name, color, count, scope, actor, sort_order, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                kind.as_str(),
                snapshot.name().unwrap_or_default(),
                snapshot.color,
                snapshot.count.unwrap_or_default(),
                scope,
                snapshot.actor,
                end,
                Utc::now().timestamp_millis(),
            ],
        )?;
        let id = self.conn.last_insert_rowid();

        if let Some(position) = snapshot.sort_order.filter(|position| *position < end) {
            let mut ids: Vec<i64> = self
                .list(kind, scope)?
                .into_iter()
                .filter_map(|entity| entity.id)
                .filter(|existing| *existing != id)
                .collect();
            let index = usize::try_from(position.max(1) - 1).unwrap_or_default();
            ids.insert(index.min(ids.len()), id);
            self.assign_order(&ids)?;
        }

        self.find_by_id(kind, id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    fn update(&self, kind: EntityKind, id: i64, fields: &EntityFields) -> rusqlite::Result<bool> {
        let Some(previous_scope) = self.scope_of(kind, id)? else {
            return Ok(false);
        };

        let rows = self.conn.execute(
            "UPDATE entities SET
                name = COALESCE(?, name),
                color = COALESCE(?, color),
                count = COALESCE(?, count),
                scope = COALESCE(?, scope),
                updated_at = ?
             WHERE kind = ? AND id = ?",
            params![
                fields.name,
                fields.color,
                fields.count,
                fields.scope,
                Utc::now().timestamp_millis(),
                kind.as_str(),
                id,
            ],
        )?;

        if let Some(scope) = fields.scope.as_deref().filter(|scope| *scope != previous_scope) {
            self.renumber(kind, &previous_scope)?;
            self.renumber(kind, scope)?;
        }
        Ok(rows > 0)
    }

    fn delete_by_name(&self, kind: EntityKind, name: &str, scope: &str) -> rusqlite::Result<bool> {
        match self.find_by_name(kind, name, scope)?.and_then(|entity| entity.id) {
            Some(id) => self.delete_by_id(kind, id),
            None => Ok(false),
        }
    }

    fn delete_by_id(&self, kind: EntityKind, id: i64) -> rusqlite::Result<bool> {
        let Some(scope) = self.scope_of(kind, id)? else {
            return Ok(false);
        };
        self.conn.execute(
            "DELETE FROM entities WHERE kind = ? AND id = ?",
            params![kind.as_str(), id],
        )?;
        self.renumber(kind, &scope)?;
        Ok(true)
    }

    fn reorder(&self, kind: EntityKind, scope: &str, names: &[String]) -> rusqlite::Result<()> {
        let mut remaining = self.list(kind, scope)?;
        let mut ordered = Vec::with_capacity(remaining.len());
        for name in names {
            if let Some(index) = remaining
                .iter()
                .position(|entity| entity.name() == Some(name.trim()))
            {
                ordered.push(remaining.remove(index));
            }
        }
        ordered.extend(remaining);

        let ids: Vec<i64> = ordered.into_iter().filter_map(|entity| entity.id).collect();
        self.assign_order(&ids)
    }

    fn list(&self, kind: EntityKind, scope: &str) -> rusqlite::Result<Vec<EntitySnapshot>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTITY_COLUMNS} FROM entities
             WHERE kind = ? AND scope = ?
             ORDER BY sort_order, id"
        ))?;
        let entities = stmt
            .query_map(params![kind.as_str(), scope], Self::parse_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }
}
