//! Error types for the subset engine
//!
//! Every precondition is checked before the first write is staged, so any
//! error returned here leaves the store exactly as it was.

use std::fmt;
use subset_model::{ProjectId, ProjectStatus, SignatureError};
use subset_store::StoreError;

/// Kind of entity named in a [`EngineError::NotFound`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Project,
    QuestionnaireLine,
    ManagedList,
    ManagedListItem,
    SubsetDefinition,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Project => "project",
            Self::QuestionnaireLine => "questionnaire line",
            Self::ManagedList => "managed list",
            Self::ManagedListItem => "managed list item",
            Self::SubsetDefinition => "subset definition",
        };
        f.write_str(s)
    }
}

/// Main engine error type
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Referenced entity does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    /// Project is not a draft
    #[error("project {project_id} is {status}; create a new version to edit subsets")]
    ReadOnlyState {
        project_id: ProjectId,
        status: ProjectStatus,
    },

    /// Request is malformed or inconsistent with the stored data
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Uniqueness race lost at commit; re-running the request re-reads and reuses
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unexpected store failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl EngineError {
    /// Create not-found error
    #[inline]
    pub fn not_found(entity: Entity, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create invalid-argument error
    #[inline]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// Check if error is caused by the project lifecycle gate
    #[inline]
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnlyState { .. })
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        if err.is_conflict() {
            Self::Conflict(err.to_string())
        } else {
            Self::Store(err)
        }
    }
}

impl From<SignatureError> for EngineError {
    fn from(err: SignatureError) -> Self {
        Self::InvalidArgument(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML could not be parsed
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid engine config: {0}")]
    Invalid(String),
}
