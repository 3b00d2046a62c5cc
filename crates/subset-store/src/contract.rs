//! Repository and unit-of-work contracts
//!
//! A [`UnitOfWork`] is opened over a consistent snapshot. Reads see the
//! snapshot plus the unit's own staged writes. Nothing is visible to other
//! callers until [`SubsetStore::commit`], which applies every staged write or
//! none of them. Commit is the only suspension point of an operation.

use crate::error::StoreError;
use async_trait::async_trait;
use subset_model::{
    ManagedList, ManagedListId, ManagedListItem, ManagedListItemId, Project, ProjectId,
    QuestionManagedList, QuestionSubsetLink, QuestionnaireLine, QuestionnaireLineId,
    SubsetDefinition, SubsetDefinitionId, SubsetMembership, SubsetMembershipId, SubsetSignature,
};

/// Summary of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitReceipt {
    /// Store version after the commit
    pub version: u64,
    /// Number of staged writes applied
    pub writes: usize,
}

/// Relational store holding the subset tables
#[async_trait]
pub trait SubsetStore: Send + Sync {
    /// Unit of work type produced by [`SubsetStore::begin`]
    type Tx: UnitOfWork;

    /// Open a unit of work over a consistent snapshot
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the store cannot be reached
    async fn begin(&self) -> Result<Self::Tx, StoreError>;

    /// Apply all staged writes atomically
    ///
    /// # Errors
    /// - [`StoreError::Conflict`] if a concurrent commit makes a staged write
    ///   violate a constraint; nothing is applied
    /// - [`StoreError::Backend`] on backend failure
    async fn commit(&self, tx: Self::Tx) -> Result<CommitReceipt, StoreError>;
}

/// Typed lookups and staged writes within one transaction
///
/// Collection lookups return rows in a deterministic order: items by sort
/// order then code, everything else by id.
pub trait UnitOfWork: Send {
    // ---- projects and questions ----

    /// Find project by id
    fn project(&self, id: ProjectId) -> Option<Project>;

    /// Find questionnaire line by id
    fn questionnaire_line(&self, id: QuestionnaireLineId) -> Option<QuestionnaireLine>;

    // ---- managed lists ----

    /// Find managed list by id
    fn managed_list(&self, id: ManagedListId) -> Option<ManagedList>;

    /// Find managed list item by id
    fn managed_list_item(&self, id: ManagedListItemId) -> Option<ManagedListItem>;

    /// All items of a list, active or not
    fn items_for_list(&self, managed_list_id: ManagedListId) -> Vec<ManagedListItem>;

    /// All question assignments of a list
    fn assignments_for_list(&self, managed_list_id: ManagedListId) -> Vec<QuestionManagedList>;

    /// Assignment of a list to a question, if any
    fn assignment(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionManagedList>;

    // ---- subsets ----

    /// Find subset by id
    fn subset(&self, id: SubsetDefinitionId) -> Option<SubsetDefinition>;

    /// Find the subset with `signature` in the (project, list) scope
    fn subset_by_signature(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        signature: &SubsetSignature,
    ) -> Option<SubsetDefinition>;

    /// All subsets in the (project, list) scope
    fn subsets_for_scope(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
    ) -> Vec<SubsetDefinition>;

    /// All subsets of a project
    fn subsets_for_project(&self, project_id: ProjectId) -> Vec<SubsetDefinition>;

    /// Membership rows of a subset
    fn memberships_for_subset(&self, subset_definition_id: SubsetDefinitionId)
        -> Vec<SubsetMembership>;

    /// Membership rows referencing an item, across all subsets
    fn memberships_for_item(&self, managed_list_item_id: ManagedListItemId)
        -> Vec<SubsetMembership>;

    /// Highest subset name sequence issued in the (project, list) scope
    fn name_high_water(&self, project_id: ProjectId, managed_list_id: ManagedListId) -> u32;

    // ---- links ----

    /// Link for a (question, list) pair, if any
    fn link(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionSubsetLink>;

    /// All links pointing at a subset
    fn links_for_subset(&self, subset_definition_id: SubsetDefinitionId) -> Vec<QuestionSubsetLink>;

    // ---- catalog writes (list management collaborators) ----

    /// Insert or replace a project
    ///
    /// # Errors
    /// Returns [`StoreError`] if the write violates a constraint
    fn put_project(&mut self, project: Project) -> Result<(), StoreError>;

    /// Insert or replace a questionnaire line
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the project does not exist
    fn put_questionnaire_line(&mut self, line: QuestionnaireLine) -> Result<(), StoreError>;

    /// Insert or replace a managed list
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the project does not exist
    fn put_managed_list(&mut self, list: ManagedList) -> Result<(), StoreError>;

    /// Insert or replace a managed list item
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the list does not exist
    fn put_managed_list_item(&mut self, item: ManagedListItem) -> Result<(), StoreError>;

    /// Insert a question assignment
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the pair is already assigned
    fn insert_assignment(&mut self, assignment: QuestionManagedList) -> Result<(), StoreError>;

    // ---- subset writes ----

    /// Insert a subset definition
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the signature already exists in scope
    fn insert_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError>;

    /// Replace an existing subset definition
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the row is gone or the new
    /// signature collides with another subset in scope
    fn update_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError>;

    /// Delete a subset and its memberships
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if any link still references it
    fn delete_subset(&mut self, id: SubsetDefinitionId) -> Result<(), StoreError>;

    /// Insert a membership row
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] on duplicate (subset, item) or missing subset
    fn insert_membership(&mut self, membership: SubsetMembership) -> Result<(), StoreError>;

    /// Delete a membership row; deleting a missing row is a no-op
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] on backend failure
    fn delete_membership(&mut self, id: SubsetMembershipId) -> Result<(), StoreError>;

    /// Raise the subset name high-water mark for a scope
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] on backend failure
    fn raise_name_high_water(
        &mut self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        sequence: u32,
    ) -> Result<(), StoreError>;

    // ---- link writes ----

    /// Insert a question subset link
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the (question, list) pair already has a link
    fn insert_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError>;

    /// Replace an existing link
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the row is gone or the subset does not exist
    fn update_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError>;

    /// Whether any write has been staged
    fn is_dirty(&self) -> bool;
}
