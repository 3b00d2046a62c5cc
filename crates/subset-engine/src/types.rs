//! Request and response types
//!
//! Plain data exchanged with callers (HTTP endpoints, list management
//! collaborators, the CLI).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use subset_model::{
    ManagedListId, ManagedListItem, ManagedListItemId, ProjectId, QuestionnaireLineId,
    SubsetDefinitionId, SubsetSignature, SubsetStatus, UserId,
};

/// Save a question's selection of list items
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSelectionRequest {
    pub project_id: ProjectId,
    pub questionnaire_line_id: QuestionnaireLineId,
    pub managed_list_id: ManagedListId,
    /// Selected items; order and duplicates are ignored
    pub selected_item_ids: Vec<ManagedListItemId>,
    pub user_id: UserId,
}

impl SaveSelectionRequest {
    #[must_use]
    pub fn new(
        project_id: ProjectId,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        selected_item_ids: impl IntoIterator<Item = ManagedListItemId>,
        user_id: UserId,
    ) -> Self {
        Self {
            project_id,
            questionnaire_line_id,
            managed_list_id,
            selected_item_ids: selected_item_ids.into_iter().collect(),
            user_id,
        }
    }
}

/// Outcome of a saved selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSelectionResult {
    pub questionnaire_line_id: QuestionnaireLineId,
    pub managed_list_id: ManagedListId,
    pub is_full_selection: bool,
    pub subset_definition_id: Option<SubsetDefinitionId>,
    pub subset_name: Option<String>,
}

/// One member of a subset, hydrated from its item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetMember {
    pub managed_list_item_id: ManagedListItemId,
    pub code: String,
    pub label: String,
    pub sort_order: i32,
    pub is_active: bool,
}

impl From<&ManagedListItem> for SubsetMember {
    fn from(item: &ManagedListItem) -> Self {
        Self {
            managed_list_item_id: item.id,
            code: item.code.clone(),
            label: item.label.clone(),
            sort_order: item.sort_order,
            is_active: item.is_active,
        }
    }
}

/// Full view of one subset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetDetails {
    pub id: SubsetDefinitionId,
    pub project_id: ProjectId,
    pub managed_list_id: ManagedListId,
    pub managed_list_name: String,
    pub name: String,
    pub signature_hash: SubsetSignature,
    pub status: SubsetStatus,
    /// Ordered by the item's sort order
    pub members: Vec<SubsetMember>,
    pub created_on: DateTime<Utc>,
    pub created_by: UserId,
}

/// Summary row for project listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsetSummary {
    pub id: SubsetDefinitionId,
    pub managed_list_id: ManagedListId,
    pub managed_list_name: String,
    pub name: String,
    pub member_count: usize,
    pub created_on: DateTime<Utc>,
    pub created_by: UserId,
}

/// All subsets of a project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSubsets {
    pub project_id: ProjectId,
    /// Ordered by list name, then subset name
    pub subsets: Vec<SubsetSummary>,
}

/// Outcome of a subset deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSubsetResult {
    pub subset_definition_id: SubsetDefinitionId,
    /// Questions whose link pointed at the subset; now on full selection
    pub affected_question_ids: Vec<QuestionnaireLineId>,
}

/// What a question currently shows for a list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionSelection {
    pub questionnaire_line_id: QuestionnaireLineId,
    pub managed_list_id: ManagedListId,
    pub is_full_selection: bool,
    pub subset_definition_id: Option<SubsetDefinitionId>,
    pub subset_name: Option<String>,
    /// Visible (active) items, ordered by sort order
    pub items: Vec<SubsetMember>,
}

impl QuestionSelection {
    /// Codes of the visible items, in display order
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.items.iter().map(|i| i.code.as_str()).collect()
    }
}

/// What an auto-association callback did
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AssociationOutcome {
    /// Callback was a no-op because the owning project is not a draft
    pub skipped_not_draft: bool,
    /// Questions that received a new full-selection link
    pub links_created: Vec<QuestionnaireLineId>,
    /// Subsets that lost a member
    pub subsets_trimmed: Vec<SubsetDefinitionId>,
    /// Projects whose summary was refreshed
    pub refreshed_projects: Vec<ProjectId>,
}

impl AssociationOutcome {
    pub(crate) fn skipped() -> Self {
        Self {
            skipped_not_draft: true,
            ..Self::default()
        }
    }
}
