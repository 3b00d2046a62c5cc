//! Persisted entities
//!
//! Relationships are explicit foreign-key ids; there are no object graphs.
//! Every row is plain data that a store can clone in and out.

use crate::ids::{
    ManagedListId, ManagedListItemId, ProjectId, QuestionManagedListId, QuestionSubsetLinkId,
    QuestionnaireLineId, SubsetDefinitionId, SubsetMembershipId, UserId,
};
use crate::signature::SubsetSignature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a questionnaire project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Editable working version
    Draft,
    /// Published study, read-only
    Active,
    /// Superseded by a newer version, read-only
    Retired,
}

impl ProjectStatus {
    /// Only draft projects may have their subsets or selections changed
    #[inline]
    #[must_use]
    pub fn is_draft(self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Retired => "retired",
        };
        f.write_str(s)
    }
}

/// Questionnaire project (study version)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub status: ProjectStatus,
}

impl Project {
    #[must_use]
    pub fn new(name: impl Into<String>, status: ProjectStatus) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            status,
        }
    }
}

/// A question within a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireLine {
    pub id: QuestionnaireLineId,
    pub project_id: ProjectId,
    pub name: String,
}

impl QuestionnaireLine {
    #[must_use]
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id: QuestionnaireLineId::new(),
            project_id,
            name: name.into(),
        }
    }
}

/// Status of a managed list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagedListStatus {
    #[default]
    Active,
    Inactive,
}

/// Project-scoped shared reference list; name is unique per project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedList {
    pub id: ManagedListId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub status: ManagedListStatus,
}

impl ManagedList {
    #[must_use]
    pub fn new(project_id: ProjectId, name: impl Into<String>) -> Self {
        Self {
            id: ManagedListId::new(),
            project_id,
            name: name.into(),
            description: None,
            status: ManagedListStatus::Active,
        }
    }

    /// With description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// One entry in a managed list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedListItem {
    pub id: ManagedListItemId,
    pub managed_list_id: ManagedListId,
    /// Stable code (the item's `Value`)
    pub code: String,
    pub label: String,
    pub sort_order: i32,
    pub is_active: bool,
    /// Free-form metadata supplied by list management
    pub metadata: Option<serde_json::Value>,
}

impl ManagedListItem {
    /// Create an active item
    #[must_use]
    pub fn new(
        managed_list_id: ManagedListId,
        code: impl Into<String>,
        label: impl Into<String>,
        sort_order: i32,
    ) -> Self {
        Self {
            id: ManagedListItemId::new(),
            managed_list_id,
            code: code.into(),
            label: label.into(),
            sort_order,
            is_active: true,
            metadata: None,
        }
    }

    /// With metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Assignment of a managed list to a questionnaire line
///
/// Existence of the row means the question may reference the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionManagedList {
    pub id: QuestionManagedListId,
    pub questionnaire_line_id: QuestionnaireLineId,
    pub managed_list_id: ManagedListId,
    pub created_on: DateTime<Utc>,
    pub created_by: UserId,
}

impl QuestionManagedList {
    #[must_use]
    pub fn new(
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        created_by: UserId,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuestionManagedListId::new(),
            questionnaire_line_id,
            managed_list_id,
            created_on,
            created_by,
        }
    }
}

/// Status of a subset definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubsetStatus {
    #[default]
    Active,
    Inactive,
}

/// Named, content-addressed subset of a list's items
///
/// Unique on (`project_id`, `managed_list_id`, `signature_hash`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetDefinition {
    pub id: SubsetDefinitionId,
    pub project_id: ProjectId,
    pub managed_list_id: ManagedListId,
    pub name: String,
    pub signature_hash: SubsetSignature,
    pub status: SubsetStatus,
    pub created_on: DateTime<Utc>,
    pub created_by: UserId,
    pub modified_on: Option<DateTime<Utc>>,
    pub modified_by: Option<UserId>,
}

impl SubsetDefinition {
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        name: impl Into<String>,
        signature_hash: SubsetSignature,
        created_by: UserId,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubsetDefinitionId::new(),
            project_id,
            managed_list_id,
            name: name.into(),
            signature_hash,
            status: SubsetStatus::Active,
            created_on,
            created_by,
            modified_on: None,
            modified_by: None,
        }
    }

    /// Stamp modification audit fields
    pub fn touch(&mut self, by: UserId, at: DateTime<Utc>) {
        self.modified_on = Some(at);
        self.modified_by = Some(by);
    }
}

/// Membership row: one item of one subset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetMembership {
    pub id: SubsetMembershipId,
    pub subset_definition_id: SubsetDefinitionId,
    pub managed_list_item_id: ManagedListItemId,
}

impl SubsetMembership {
    #[must_use]
    pub fn new(
        subset_definition_id: SubsetDefinitionId,
        managed_list_item_id: ManagedListItemId,
    ) -> Self {
        Self {
            id: SubsetMembershipId::new(),
            subset_definition_id,
            managed_list_item_id,
        }
    }
}

/// Which subset a question uses for a list
///
/// Unique on (`questionnaire_line_id`, `managed_list_id`). A `None` subset
/// means the question shows every active item of the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSubsetLink {
    pub id: QuestionSubsetLinkId,
    pub project_id: ProjectId,
    pub questionnaire_line_id: QuestionnaireLineId,
    pub managed_list_id: ManagedListId,
    pub subset_definition_id: Option<SubsetDefinitionId>,
    pub created_on: DateTime<Utc>,
    pub created_by: UserId,
    pub modified_on: Option<DateTime<Utc>>,
    pub modified_by: Option<UserId>,
}

impl QuestionSubsetLink {
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        subset_definition_id: Option<SubsetDefinitionId>,
        created_by: UserId,
        created_on: DateTime<Utc>,
    ) -> Self {
        Self {
            id: QuestionSubsetLinkId::new(),
            project_id,
            questionnaire_line_id,
            managed_list_id,
            subset_definition_id,
            created_on,
            created_by,
            modified_on: None,
            modified_by: None,
        }
    }

    /// True when the question uses the full active set of the list
    #[inline]
    #[must_use]
    pub fn is_full_selection(&self) -> bool {
        self.subset_definition_id.is_none()
    }

    /// Point the link at another subset (or full selection) and stamp audit fields
    pub fn repoint(
        &mut self,
        subset_definition_id: Option<SubsetDefinitionId>,
        by: UserId,
        at: DateTime<Utc>,
    ) {
        self.subset_definition_id = subset_definition_id;
        self.modified_on = Some(at);
        self.modified_by = Some(by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_draft_is_editable() {
        assert!(ProjectStatus::Draft.is_draft());
        assert!(!ProjectStatus::Active.is_draft());
        assert!(!ProjectStatus::Retired.is_draft());
    }

    #[test]
    fn new_items_are_active() {
        let item = ManagedListItem::new(ManagedListId::new(), "US", "United States", 1);
        assert!(item.is_active);
        assert!(item.metadata.is_none());
    }

    #[test]
    fn link_repoint_stamps_audit() {
        let user = UserId::new();
        let now = Utc::now();
        let mut link = QuestionSubsetLink::new(
            ProjectId::new(),
            QuestionnaireLineId::new(),
            ManagedListId::new(),
            None,
            user,
            now,
        );
        assert!(link.is_full_selection());
        assert!(link.modified_on.is_none());

        let subset = SubsetDefinitionId::new();
        link.repoint(Some(subset), user, now);
        assert_eq!(link.subset_definition_id, Some(subset));
        assert!(!link.is_full_selection());
        assert_eq!(link.modified_by, Some(user));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ProjectStatus::Draft).unwrap();
        assert_eq!(json, "\"draft\"");
    }
}
