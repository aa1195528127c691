//! Log metadata envelope and the mutations undo reconstructs from it

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::{EntityAction, EntitySnapshot};

/// Structured metadata stored with a log entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMetadata {
    /// Entity fields before the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_data: Option<EntitySnapshot>,
    /// Entity fields after the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_data: Option<EntitySnapshot>,
    /// Free-form context supplied by the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
}

impl LogMetadata {
    pub fn is_empty(&self) -> bool {
        self.pre_data.is_none() && self.post_data.is_none() && self.additional_data.is_none()
    }

    /// Parse stored metadata without ever failing.
    ///
    /// Metadata written by older clients is sometimes JSON-encoded twice, so a
    /// decoded JSON string is decoded one more time. Anything unparseable
    /// yields empty metadata; validation happens where fields are needed.
    pub fn parse_lenient(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value_lenient(value),
            Err(error) => {
                tracing::debug!("Discarding unparseable log metadata: {error}");
                Self::default()
            }
        }
    }

    /// Same as [`LogMetadata::parse_lenient`] for an already decoded value
    pub fn from_value_lenient(value: Value) -> Self {
        let value = match value {
            Value::String(inner) => match serde_json::from_str::<Value>(&inner) {
                Ok(decoded) => decoded,
                Err(error) => {
                    tracing::debug!("Discarding double-encoded log metadata: {error}");
                    return Self::default();
                }
            },
            other => other,
        };

        if value.is_null() {
            return Self::default();
        }

        serde_json::from_value(value).unwrap_or_else(|error| {
            tracing::debug!("Log metadata has unexpected shape: {error}");
            Self::default()
        })
    }
}

/// Missing or unusable metadata for an undo request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("log metadata has no postData")]
    MissingPostData,
    #[error("log metadata has no preData")]
    MissingPreData,
    #[error("log metadata {0} has no name")]
    MissingName(&'static str),
    #[error("{0} entries cannot be reversed")]
    UnsupportedAction(&'static str),
}

/// A logged entity mutation, decoded into the shape undo needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityMutation {
    Create { post: EntitySnapshot },
    Update {
        pre: EntitySnapshot,
        post: EntitySnapshot,
    },
    Delete { pre: EntitySnapshot },
}

impl EntityMutation {
    pub fn from_metadata(
        action: EntityAction,
        metadata: LogMetadata,
    ) -> Result<Self, MetadataError> {
        match action {
            EntityAction::Created => {
                let post = require_named(metadata.post_data, "postData", MetadataError::MissingPostData)?;
                Ok(Self::Create { post })
            }
            EntityAction::Updated => {
                let post = require_named(metadata.post_data, "postData", MetadataError::MissingPostData)?;
                let pre = require_named(metadata.pre_data, "preData", MetadataError::MissingPreData)?;
                Ok(Self::Update { pre, post })
            }
            EntityAction::Deleted => {
                let pre = require_named(metadata.pre_data, "preData", MetadataError::MissingPreData)?;
                Ok(Self::Delete { pre })
            }
            EntityAction::Reordered => Err(MetadataError::UnsupportedAction(action.as_str())),
        }
    }
}

fn require_named(
    snapshot: Option<EntitySnapshot>,
    field: &'static str,
    missing: MetadataError,
) -> Result<EntitySnapshot, MetadataError> {
    let snapshot = snapshot.ok_or(missing)?;
    if snapshot.name().is_none() {
        return Err(MetadataError::MissingName(field));
    }
    Ok(snapshot)
}
