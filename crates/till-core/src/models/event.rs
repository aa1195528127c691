//! Event taxonomy for the activity log

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::EntityKind;

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityAction {
    Created,
    Updated,
    Deleted,
    /// Bulk sort-order reassignment within a scope
    Reordered,
}

impl EntityAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Reordered => "reordered",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(Self::Created),
            "updated" => Some(Self::Updated),
            "deleted" => Some(Self::Deleted),
            "reordered" => Some(Self::Reordered),
            _ => None,
        }
    }
}

/// Kind of an activity log entry.
///
/// Serialized as the snake-case wire name, e.g. `place_created`,
/// `auth_sign_in` or `sync_failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EventKind {
    Navigation,
    SignIn,
    SignUp,
    SignOut,
    Entity(EntityKind, EntityAction),
    SyncCompleted,
    SyncFailed,
    Error,
    Undo,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown event kind `{0}`")]
pub struct ParseEventKindError(pub String);

impl EventKind {
    pub const fn created(kind: EntityKind) -> Self {
        Self::Entity(kind, EntityAction::Created)
    }

    pub const fn updated(kind: EntityKind) -> Self {
        Self::Entity(kind, EntityAction::Updated)
    }

    pub const fn deleted(kind: EntityKind) -> Self {
        Self::Entity(kind, EntityAction::Deleted)
    }

    pub const fn reordered(kind: EntityKind) -> Self {
        Self::Entity(kind, EntityAction::Reordered)
    }

    /// Entity and action for entity mutations, `None` for everything else
    pub const fn entity_mutation(self) -> Option<(EntityKind, EntityAction)> {
        match self {
            Self::Entity(kind, action) => Some((kind, action)),
            _ => None,
        }
    }

    /// Session boundary events
    pub const fn is_auth(self) -> bool {
        matches!(self, Self::SignIn | Self::SignUp | Self::SignOut)
    }

    /// Default template, with a trailing count clause on creations that carry a count
    pub fn template_for(self, has_count: bool) -> String {
        let template = self.default_template();
        if has_count && matches!(self, Self::Entity(_, EntityAction::Created)) {
            format!("{template} with {{count}}")
        } else {
            template
        }
    }

    /// Default message template; `{name}` and `{count}` are filled from context
    pub fn default_template(self) -> String {
        match self {
            Self::Navigation => "Opened {name}".to_string(),
            Self::SignIn => "Signed in as {name}".to_string(),
            Self::SignUp => "Created account {name}".to_string(),
            Self::SignOut => "Signed out {name}".to_string(),
            Self::Entity(kind, EntityAction::Created) => {
                format!("Created {} \"{{name}}\"", kind.as_str())
            }
            Self::Entity(kind, EntityAction::Updated) => {
                format!("Updated {} \"{{name}}\"", kind.as_str())
            }
            Self::Entity(kind, EntityAction::Deleted) => {
                format!("Deleted {} \"{{name}}\"", kind.as_str())
            }
            Self::Entity(_, EntityAction::Reordered) => "Reordered {count}".to_string(),
            Self::SyncCompleted => "Synced {count}".to_string(),
            Self::SyncFailed => "Sync failed: {name}".to_string(),
            Self::Error => "Error: {name}".to_string(),
            Self::Undo => "Undid {name}".to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation => f.write_str("navigation"),
            Self::SignIn => f.write_str("auth_sign_in"),
            Self::SignUp => f.write_str("auth_sign_up"),
            Self::SignOut => f.write_str("auth_sign_out"),
            Self::Entity(kind, action) => write!(f, "{}_{}", kind.as_str(), action.as_str()),
            Self::SyncCompleted => f.write_str("sync_completed"),
            Self::SyncFailed => f.write_str("sync_failed"),
            Self::Error => f.write_str("error"),
            Self::Undo => f.write_str("undo"),
        }
    }
}

impl FromStr for EventKind {
    type Err = ParseEventKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "navigation" => Self::Navigation,
            "auth_sign_in" | "sign_in" => Self::SignIn,
            "auth_sign_up" | "sign_up" => Self::SignUp,
            "auth_sign_out" | "sign_out" => Self::SignOut,
            "sync_completed" => Self::SyncCompleted,
            "sync_failed" => Self::SyncFailed,
            "error" => Self::Error,
            "undo" => Self::Undo,
            other => {
                let (entity, action) = other
                    .rsplit_once('_')
                    .ok_or_else(|| ParseEventKindError(s.to_string()))?;
                let entity = entity
                    .parse::<EntityKind>()
                    .map_err(|_| ParseEventKindError(s.to_string()))?;
                let action =
                    EntityAction::parse(action).ok_or_else(|| ParseEventKindError(s.to_string()))?;
                Self::Entity(entity, action)
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for EventKind {
    type Error = ParseEventKindError;

    fn try_from(value: String) -> Result<Self, ParseEventKindError> {
        value.parse()
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.to_string()
    }
}
