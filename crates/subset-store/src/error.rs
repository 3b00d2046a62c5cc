//! Store error types

use std::fmt;

/// Constraint that rejected a write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    /// (project, list, signature) on subset definitions
    SubsetSignature,
    /// (questionnaire line, list) on question subset links
    QuestionSubsetLink,
    /// (subset, item) on subset memberships
    SubsetMembership,
    /// (questionnaire line, list) on question list assignments
    QuestionAssignment,
    /// (project, name) on managed lists
    ManagedListName,
    /// A referenced row no longer exists
    ForeignKey,
    /// A row was changed or removed by a concurrent commit
    StaleRow,
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SubsetSignature => "subset_signature_unique",
            Self::QuestionSubsetLink => "question_subset_link_unique",
            Self::SubsetMembership => "subset_membership_unique",
            Self::QuestionAssignment => "question_assignment_unique",
            Self::ManagedListName => "managed_list_name_unique",
            Self::ForeignKey => "foreign_key",
            Self::StaleRow => "stale_row",
        };
        f.write_str(s)
    }
}

/// Store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Uniqueness or referential constraint violated; recoverable by re-reading
    #[error("constraint {constraint} violated: {detail}")]
    Conflict {
        /// Constraint that fired
        constraint: Constraint,
        /// Offending row, for logs
        detail: String,
    },

    /// Backend failure (connection, IO, serialization)
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create conflict error
    #[inline]
    pub fn conflict(constraint: Constraint, detail: impl Into<String>) -> Self {
        Self::Conflict {
            constraint,
            detail: detail.into(),
        }
    }

    /// Check if the error is a constraint conflict
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
