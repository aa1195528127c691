//! Entity kinds and the snapshots the log keeps of them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Back-office entities whose mutations are recorded in the activity log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Place,
    Table,
    Category,
    Menu,
}

impl EntityKind {
    pub const ALL: [Self; 4] = [Self::Place, Self::Table, Self::Category, Self::Menu];

    /// Wire name used in event kinds and table names
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Place => "place",
            Self::Table => "table",
            Self::Category => "category",
            Self::Menu => "menu",
        }
    }

    /// Capitalized label for human-readable messages
    pub const fn label(self) -> &'static str {
        match self {
            Self::Place => "Place",
            Self::Table => "Table",
            Self::Category => "Category",
            Self::Menu => "Menu",
        }
    }

    /// Singular noun counted by the entity's `count` field
    pub const fn count_noun(self) -> &'static str {
        match self {
            Self::Place => "table",
            Self::Table => "seat",
            Self::Category => "menu",
            Self::Menu => "option",
        }
    }

    /// Whether logged mutations of this kind can be reversed by undo
    pub const fn supports_undo(self) -> bool {
        matches!(self, Self::Place | Self::Category | Self::Menu)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "place" | "places" => Ok(Self::Place),
            "table" | "tables" => Ok(Self::Table),
            "category" | "categories" => Ok(Self::Category),
            "menu" | "menus" => Ok(Self::Menu),
            other => Err(format!("unknown entity kind `{other}`")),
        }
    }
}

/// Field snapshot of an entity at the time a mutation was logged.
///
/// Every field is optional because snapshots arrive from several client
/// generations; undo validates what it needs. Scope and actor accept the
/// legacy `storeNumber`/`userId` keys and numeric values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Durable identifier, when the emitter knew it
    #[serde(
        default,
        deserialize_with = "lenient_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        default,
        alias = "tableCount",
        alias = "seatCount",
        alias = "menuCount",
        alias = "optionCount",
        deserialize_with = "lenient_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub count: Option<i64>,
    #[serde(
        default,
        alias = "storeNumber",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub scope: Option<String>,
    #[serde(
        default,
        alias = "userId",
        deserialize_with = "lenient_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub actor: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_i64",
        skip_serializing_if = "Option::is_none"
    )]
    pub sort_order: Option<i64>,
}

impl EntitySnapshot {
    /// Snapshot carrying only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub const fn with_count(mut self, count: i64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    #[must_use]
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Trimmed, non-empty name
    pub fn name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        Some(Value::Bool(value)) => Some(value.to_string()),
        _ => None,
    })
}

#[allow(clippy::cast_possible_truncation)]
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(value)) => value
            .as_i64()
            .or_else(|| value.as_f64().map(|float| float.round() as i64)),
        Some(Value::String(value)) => value.trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn entity_kind_parses_singular_and_plural() {
        assert_eq!("Place".parse::<EntityKind>().unwrap(), EntityKind::Place);
        assert_eq!(
            "categories".parse::<EntityKind>().unwrap(),
            EntityKind::Category
        );
        assert!("waiter".parse::<EntityKind>().is_err());
    }

    #[test]
    fn only_tables_are_excluded_from_undo() {
        assert!(EntityKind::Place.supports_undo());
        assert!(EntityKind::Category.supports_undo());
        assert!(EntityKind::Menu.supports_undo());
        assert!(!EntityKind::Table.supports_undo());
    }

    #[test]
    fn snapshot_accepts_legacy_keys_and_numeric_scope() {
        let snapshot: EntitySnapshot = serde_json::from_str(
            r#"{"name":"Terrace","color":"green","tableCount":"4","storeNumber":17,"userId":"u-1"}"#,
        )
        .unwrap();

        assert_eq!(
            snapshot,
            EntitySnapshot::named("Terrace")
                .with_color("green")
                .with_count(4)
                .with_scope("17")
                .with_actor("u-1")
        );
    }

    #[test]
    fn snapshot_serializes_camel_case_without_empty_fields() {
        let snapshot = EntitySnapshot {
            sort_order: Some(2),
            ..EntitySnapshot::named("Bar")
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, serde_json::json!({"name": "Bar", "sortOrder": 2}));
    }

    #[test]
    fn blank_name_is_treated_as_missing() {
        assert_eq!(EntitySnapshot::named("   ").name(), None);
        assert_eq!(EntitySnapshot::named(" Bar ").name(), Some("Bar"));
    }
}
