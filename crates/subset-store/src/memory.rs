//! In-memory store
//!
//! [`InMemoryStore`] keeps committed tables behind a lock. A unit of work
//! clones the tables at `begin`, applies each write to its private copy
//! (so reads see their own writes) and records it as a [`Mutation`].
//! `commit` replays the mutations against the *current* tables with every
//! constraint re-checked, so two racing units that both pass their local
//! checks still cannot commit a duplicate signature or link.

use crate::contract::{CommitReceipt, SubsetStore, UnitOfWork};
use crate::error::{Constraint, StoreError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use subset_model::{
    ManagedList, ManagedListId, ManagedListItem, ManagedListItemId, Project, ProjectId,
    QuestionManagedList, QuestionManagedListId, QuestionSubsetLink, QuestionSubsetLinkId,
    QuestionnaireLine, QuestionnaireLineId, SubsetDefinition, SubsetDefinitionId,
    SubsetMembership, SubsetMembershipId, SubsetSignature,
};

/// A staged write
#[derive(Debug, Clone)]
pub enum Mutation {
    /// Insert or replace a project
    PutProject(Project),
    /// Insert or replace a questionnaire line
    PutQuestionnaireLine(QuestionnaireLine),
    /// Insert or replace a managed list
    PutManagedList(ManagedList),
    /// Insert or replace a managed list item
    PutManagedListItem(ManagedListItem),
    /// Wire a managed list to a question
    InsertAssignment(QuestionManagedList),
    /// Create a subset; its signature must be unused in its scope
    InsertSubset(SubsetDefinition),
    /// Replace an existing subset row
    UpdateSubset(SubsetDefinition),
    /// Remove a subset and its memberships
    DeleteSubset(SubsetDefinitionId),
    /// Add one item to a subset
    InsertMembership(SubsetMembership),
    /// Remove one membership row
    DeleteMembership(SubsetMembershipId),
    /// Raise the highest subset suffix handed out for a list
    RaiseNameHighWater {
        /// Owning project
        project_id: ProjectId,
        /// List the names belong to
        managed_list_id: ManagedListId,
        /// Suffix just used; lower values leave the mark unchanged
        sequence: u32,
    },
    /// Create a question's link to a list
    InsertLink(QuestionSubsetLink),
    /// Repoint an existing link
    UpdateLink(QuestionSubsetLink),
}

/// The full set of tables
#[derive(Debug, Clone, Default)]
pub struct Tables {
    projects: BTreeMap<ProjectId, Project>,
    lines: BTreeMap<QuestionnaireLineId, QuestionnaireLine>,
    lists: BTreeMap<ManagedListId, ManagedList>,
    items: BTreeMap<ManagedListItemId, ManagedListItem>,
    assignments: BTreeMap<QuestionManagedListId, QuestionManagedList>,
    subsets: BTreeMap<SubsetDefinitionId, SubsetDefinition>,
    memberships: BTreeMap<SubsetMembershipId, SubsetMembership>,
    links: BTreeMap<QuestionSubsetLinkId, QuestionSubsetLink>,
    name_high_water: BTreeMap<(ProjectId, ManagedListId), u32>,
}

impl Tables {
    /// Number of subset definitions
    #[must_use]
    pub fn subset_count(&self) -> usize {
        self.subsets.len()
    }

    /// Number of membership rows
    #[must_use]
    pub fn membership_count(&self) -> usize {
        self.memberships.len()
    }

    /// Number of question subset links
    #[must_use]
    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Iterate over all links
    pub fn links(&self) -> impl Iterator<Item = &QuestionSubsetLink> {
        self.links.values()
    }

    /// Iterate over all subsets
    pub fn subsets(&self) -> impl Iterator<Item = &SubsetDefinition> {
        self.subsets.values()
    }

    fn items_sorted<'a>(items: impl Iterator<Item = &'a ManagedListItem>) -> Vec<ManagedListItem> {
        let mut out: Vec<ManagedListItem> = items.cloned().collect();
        out.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.code.cmp(&b.code))
        });
        out
    }

    fn find_link(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<&QuestionSubsetLink> {
        self.links.values().find(|l| {
            l.questionnaire_line_id == questionnaire_line_id && l.managed_list_id == managed_list_id
        })
    }

    fn find_subset_by_signature(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        signature: &SubsetSignature,
    ) -> Option<&SubsetDefinition> {
        self.subsets.values().find(|s| {
            s.project_id == project_id
                && s.managed_list_id == managed_list_id
                && &s.signature_hash == signature
        })
    }

    /// Apply one mutation, enforcing all constraints
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] naming the violated constraint
    pub fn apply(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        match mutation {
            Mutation::PutProject(project) => {
                self.projects.insert(project.id, project);
            }
            Mutation::PutQuestionnaireLine(line) => {
                self.require_project(line.project_id)?;
                self.lines.insert(line.id, line);
            }
            Mutation::PutManagedList(list) => {
                self.require_project(list.project_id)?;
                let name_taken = self.lists.values().any(|l| {
                    l.id != list.id && l.project_id == list.project_id && l.name == list.name
                });
                if name_taken {
                    return Err(StoreError::conflict(
                        Constraint::ManagedListName,
                        format!("list name {:?} already used in project {}", list.name, list.project_id),
                    ));
                }
                self.lists.insert(list.id, list);
            }
            Mutation::PutManagedListItem(item) => {
                if !self.lists.contains_key(&item.managed_list_id) {
                    return Err(StoreError::conflict(
                        Constraint::ForeignKey,
                        format!("managed list {} not found", item.managed_list_id),
                    ));
                }
                self.items.insert(item.id, item);
            }
            Mutation::InsertAssignment(assignment) => self.insert_assignment(assignment)?,
            Mutation::InsertSubset(subset) => self.insert_subset(subset)?,
            Mutation::UpdateSubset(subset) => self.update_subset(subset)?,
            Mutation::DeleteSubset(id) => self.delete_subset(id)?,
            Mutation::InsertMembership(membership) => self.insert_membership(membership)?,
            Mutation::DeleteMembership(id) => {
                self.memberships.remove(&id);
            }
            Mutation::RaiseNameHighWater {
                project_id,
                managed_list_id,
                sequence,
            } => {
                let mark = self
                    .name_high_water
                    .entry((project_id, managed_list_id))
                    .or_insert(0);
                *mark = (*mark).max(sequence);
            }
            Mutation::InsertLink(link) => self.insert_link(link)?,
            Mutation::UpdateLink(link) => self.update_link(link)?,
        }
        Ok(())
    }

    fn require_project(&self, id: ProjectId) -> Result<(), StoreError> {
        if self.projects.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::conflict(
                Constraint::ForeignKey,
                format!("project {id} not found"),
            ))
        }
    }

    fn require_subset(&self, id: Option<SubsetDefinitionId>) -> Result<(), StoreError> {
        match id {
            Some(id) if !self.subsets.contains_key(&id) => Err(StoreError::conflict(
                Constraint::ForeignKey,
                format!("subset {id} not found"),
            )),
            _ => Ok(()),
        }
    }

    fn insert_assignment(&mut self, assignment: QuestionManagedList) -> Result<(), StoreError> {
        if !self.lines.contains_key(&assignment.questionnaire_line_id)
            || !self.lists.contains_key(&assignment.managed_list_id)
        {
            return Err(StoreError::conflict(
                Constraint::ForeignKey,
                "assignment references a missing question or list",
            ));
        }
        let exists = self.assignments.values().any(|a| {
            a.questionnaire_line_id == assignment.questionnaire_line_id
                && a.managed_list_id == assignment.managed_list_id
        });
        if exists {
            return Err(StoreError::conflict(
                Constraint::QuestionAssignment,
                format!(
                    "list {} already assigned to question {}",
                    assignment.managed_list_id, assignment.questionnaire_line_id
                ),
            ));
        }
        self.assignments.insert(assignment.id, assignment);
        Ok(())
    }

    fn check_signature_free(&self, subset: &SubsetDefinition) -> Result<(), StoreError> {
        match self.find_subset_by_signature(
            subset.project_id,
            subset.managed_list_id,
            &subset.signature_hash,
        ) {
            Some(other) if other.id != subset.id => Err(StoreError::conflict(
                Constraint::SubsetSignature,
                format!(
                    "signature {} already owned by subset {}",
                    subset.signature_hash.short(),
                    other.id
                ),
            )),
            _ => Ok(()),
        }
    }

    fn insert_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError> {
        self.require_project(subset.project_id)?;
        if !self.lists.contains_key(&subset.managed_list_id) {
            return Err(StoreError::conflict(
                Constraint::ForeignKey,
                format!("managed list {} not found", subset.managed_list_id),
            ));
        }
        if self.subsets.contains_key(&subset.id) {
            return Err(StoreError::conflict(
                Constraint::StaleRow,
                format!("subset {} already exists", subset.id),
            ));
        }
        self.check_signature_free(&subset)?;
        self.subsets.insert(subset.id, subset);
        Ok(())
    }

    fn update_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError> {
        if !self.subsets.contains_key(&subset.id) {
            return Err(StoreError::conflict(
                Constraint::StaleRow,
                format!("subset {} no longer exists", subset.id),
            ));
        }
        self.check_signature_free(&subset)?;
        self.subsets.insert(subset.id, subset);
        Ok(())
    }

    fn delete_subset(&mut self, id: SubsetDefinitionId) -> Result<(), StoreError> {
        if !self.subsets.contains_key(&id) {
            return Err(StoreError::conflict(
                Constraint::StaleRow,
                format!("subset {id} no longer exists"),
            ));
        }
        if let Some(link) = self.links.values().find(|l| l.subset_definition_id == Some(id)) {
            return Err(StoreError::conflict(
                Constraint::ForeignKey,
                format!("subset {id} still referenced by question {}", link.questionnaire_line_id),
            ));
        }
        self.memberships.retain(|_, m| m.subset_definition_id != id);
        self.subsets.remove(&id);
        Ok(())
    }

    fn insert_membership(&mut self, membership: SubsetMembership) -> Result<(), StoreError> {
        self.require_subset(Some(membership.subset_definition_id))?;
        if !self.items.contains_key(&membership.managed_list_item_id) {
            return Err(StoreError::conflict(
                Constraint::ForeignKey,
                format!("item {} not found", membership.managed_list_item_id),
            ));
        }
        let exists = self.memberships.values().any(|m| {
            m.subset_definition_id == membership.subset_definition_id
                && m.managed_list_item_id == membership.managed_list_item_id
        });
        if exists {
            return Err(StoreError::conflict(
                Constraint::SubsetMembership,
                format!(
                    "item {} already a member of subset {}",
                    membership.managed_list_item_id, membership.subset_definition_id
                ),
            ));
        }
        self.memberships.insert(membership.id, membership);
        Ok(())
    }

    fn insert_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError> {
        if self
            .find_link(link.questionnaire_line_id, link.managed_list_id)
            .is_some()
        {
            return Err(StoreError::conflict(
                Constraint::QuestionSubsetLink,
                format!(
                    "question {} already linked for list {}",
                    link.questionnaire_line_id, link.managed_list_id
                ),
            ));
        }
        self.require_subset(link.subset_definition_id)?;
        self.links.insert(link.id, link);
        Ok(())
    }

    fn update_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError> {
        let Some(current) = self.links.get(&link.id) else {
            return Err(StoreError::conflict(
                Constraint::StaleRow,
                format!("link {} no longer exists", link.id),
            ));
        };
        if current.questionnaire_line_id != link.questionnaire_line_id
            || current.managed_list_id != link.managed_list_id
        {
            return Err(StoreError::conflict(
                Constraint::QuestionSubsetLink,
                format!("link {} cannot change its (question, list) key", link.id),
            ));
        }
        self.require_subset(link.subset_definition_id)?;
        self.links.insert(link.id, link);
        Ok(())
    }

    // ---- reads ----

    /// Find project by id
    #[must_use]
    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.projects.get(&id).cloned()
    }

    /// Find questionnaire line by id
    #[must_use]
    pub fn questionnaire_line(&self, id: QuestionnaireLineId) -> Option<QuestionnaireLine> {
        self.lines.get(&id).cloned()
    }

    /// Find managed list by id
    #[must_use]
    pub fn managed_list(&self, id: ManagedListId) -> Option<ManagedList> {
        self.lists.get(&id).cloned()
    }

    /// Find managed list item by id
    #[must_use]
    pub fn managed_list_item(&self, id: ManagedListItemId) -> Option<ManagedListItem> {
        self.items.get(&id).cloned()
    }

    /// All items of a list, by sort order then code
    #[must_use]
    pub fn items_for_list(&self, managed_list_id: ManagedListId) -> Vec<ManagedListItem> {
        Self::items_sorted(
            self.items
                .values()
                .filter(|i| i.managed_list_id == managed_list_id),
        )
    }

    /// All assignments of a list
    #[must_use]
    pub fn assignments_for_list(&self, managed_list_id: ManagedListId) -> Vec<QuestionManagedList> {
        self.assignments
            .values()
            .filter(|a| a.managed_list_id == managed_list_id)
            .cloned()
            .collect()
    }

    /// Assignment for a (question, list) pair
    #[must_use]
    pub fn assignment(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionManagedList> {
        self.assignments
            .values()
            .find(|a| {
                a.questionnaire_line_id == questionnaire_line_id
                    && a.managed_list_id == managed_list_id
            })
            .cloned()
    }

    /// Find subset by id
    #[must_use]
    pub fn subset(&self, id: SubsetDefinitionId) -> Option<SubsetDefinition> {
        self.subsets.get(&id).cloned()
    }

    /// Find subset by signature within a scope
    #[must_use]
    pub fn subset_by_signature(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        signature: &SubsetSignature,
    ) -> Option<SubsetDefinition> {
        self.find_subset_by_signature(project_id, managed_list_id, signature)
            .cloned()
    }

    /// All subsets in a (project, list) scope
    #[must_use]
    pub fn subsets_for_scope(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
    ) -> Vec<SubsetDefinition> {
        self.subsets
            .values()
            .filter(|s| s.project_id == project_id && s.managed_list_id == managed_list_id)
            .cloned()
            .collect()
    }

    /// All subsets of a project
    #[must_use]
    pub fn subsets_for_project(&self, project_id: ProjectId) -> Vec<SubsetDefinition> {
        self.subsets
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Membership rows of a subset
    #[must_use]
    pub fn memberships_for_subset(
        &self,
        subset_definition_id: SubsetDefinitionId,
    ) -> Vec<SubsetMembership> {
        self.memberships
            .values()
            .filter(|m| m.subset_definition_id == subset_definition_id)
            .cloned()
            .collect()
    }

    /// Membership rows referencing an item
    #[must_use]
    pub fn memberships_for_item(
        &self,
        managed_list_item_id: ManagedListItemId,
    ) -> Vec<SubsetMembership> {
        self.memberships
            .values()
            .filter(|m| m.managed_list_item_id == managed_list_item_id)
            .cloned()
            .collect()
    }

    /// Highest name sequence issued in a scope
    #[must_use]
    pub fn name_high_water(&self, project_id: ProjectId, managed_list_id: ManagedListId) -> u32 {
        self.name_high_water
            .get(&(project_id, managed_list_id))
            .copied()
            .unwrap_or(0)
    }

    /// Link for a (question, list) pair
    #[must_use]
    pub fn link(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionSubsetLink> {
        self.find_link(questionnaire_line_id, managed_list_id).cloned()
    }

    /// Links pointing at a subset
    #[must_use]
    pub fn links_for_subset(&self, subset_definition_id: SubsetDefinitionId) -> Vec<QuestionSubsetLink> {
        self.links
            .values()
            .filter(|l| l.subset_definition_id == Some(subset_definition_id))
            .cloned()
            .collect()
    }
}

#[derive(Debug, Default)]
struct Committed {
    version: u64,
    tables: Tables,
}

/// In-memory [`SubsetStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<Committed>,
}

impl InMemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clone of the committed tables
    #[must_use]
    pub fn snapshot(&self) -> Tables {
        self.state.read().tables.clone()
    }

    /// Current committed version
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.read().version
    }
}

#[async_trait]
impl SubsetStore for InMemoryStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let state = self.state.read();
        Ok(MemoryUnitOfWork {
            base_version: state.version,
            working: state.tables.clone(),
            staged: Vec::new(),
        })
    }

    async fn commit(&self, tx: Self::Tx) -> Result<CommitReceipt, StoreError> {
        let MemoryUnitOfWork {
            base_version,
            working,
            staged,
        } = tx;

        let mut state = self.state.write();
        if staged.is_empty() {
            return Ok(CommitReceipt {
                version: state.version,
                writes: 0,
            });
        }

        let writes = staged.len();
        let next = if state.version == base_version {
            // Nothing committed since begin: the working copy is already the result
            working
        } else {
            let mut replay = state.tables.clone();
            for mutation in staged {
                if let Err(err) = replay.apply(mutation) {
                    tracing::warn!(
                        base_version,
                        current_version = state.version,
                        error = %err,
                        "commit rejected"
                    );
                    return Err(err);
                }
            }
            replay
        };

        state.tables = next;
        state.version += 1;
        tracing::debug!(version = state.version, writes, "commit applied");

        Ok(CommitReceipt {
            version: state.version,
            writes,
        })
    }
}

/// Unit of work over an [`InMemoryStore`] snapshot
#[derive(Debug)]
pub struct MemoryUnitOfWork {
    base_version: u64,
    working: Tables,
    staged: Vec<Mutation>,
}

impl MemoryUnitOfWork {
    fn stage(&mut self, mutation: Mutation) -> Result<(), StoreError> {
        self.working.apply(mutation.clone())?;
        self.staged.push(mutation);
        Ok(())
    }

    /// Staged writes in order
    #[must_use]
    pub fn staged(&self) -> &[Mutation] {
        &self.staged
    }
}

impl UnitOfWork for MemoryUnitOfWork {
    fn project(&self, id: ProjectId) -> Option<Project> {
        self.working.project(id)
    }

    fn questionnaire_line(&self, id: QuestionnaireLineId) -> Option<QuestionnaireLine> {
        self.working.questionnaire_line(id)
    }

    fn managed_list(&self, id: ManagedListId) -> Option<ManagedList> {
        self.working.managed_list(id)
    }

    fn managed_list_item(&self, id: ManagedListItemId) -> Option<ManagedListItem> {
        self.working.managed_list_item(id)
    }

    fn items_for_list(&self, managed_list_id: ManagedListId) -> Vec<ManagedListItem> {
        self.working.items_for_list(managed_list_id)
    }

    fn assignments_for_list(&self, managed_list_id: ManagedListId) -> Vec<QuestionManagedList> {
        self.working.assignments_for_list(managed_list_id)
    }

    fn assignment(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionManagedList> {
        self.working.assignment(questionnaire_line_id, managed_list_id)
    }

    fn subset(&self, id: SubsetDefinitionId) -> Option<SubsetDefinition> {
        self.working.subset(id)
    }

    fn subset_by_signature(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        signature: &SubsetSignature,
    ) -> Option<SubsetDefinition> {
        self.working
            .subset_by_signature(project_id, managed_list_id, signature)
    }

    fn subsets_for_scope(
        &self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
    ) -> Vec<SubsetDefinition> {
        self.working.subsets_for_scope(project_id, managed_list_id)
    }

    fn subsets_for_project(&self, project_id: ProjectId) -> Vec<SubsetDefinition> {
        self.working.subsets_for_project(project_id)
    }

    fn memberships_for_subset(
        &self,
        subset_definition_id: SubsetDefinitionId,
    ) -> Vec<SubsetMembership> {
        self.working.memberships_for_subset(subset_definition_id)
    }

    fn memberships_for_item(
        &self,
        managed_list_item_id: ManagedListItemId,
    ) -> Vec<SubsetMembership> {
        self.working.memberships_for_item(managed_list_item_id)
    }

    fn name_high_water(&self, project_id: ProjectId, managed_list_id: ManagedListId) -> u32 {
        self.working.name_high_water(project_id, managed_list_id)
    }

    fn link(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Option<QuestionSubsetLink> {
        self.working.link(questionnaire_line_id, managed_list_id)
    }

    fn links_for_subset(&self, subset_definition_id: SubsetDefinitionId) -> Vec<QuestionSubsetLink> {
        self.working.links_for_subset(subset_definition_id)
    }

    fn put_project(&mut self, project: Project) -> Result<(), StoreError> {
        self.stage(Mutation::PutProject(project))
    }

    fn put_questionnaire_line(&mut self, line: QuestionnaireLine) -> Result<(), StoreError> {
        self.stage(Mutation::PutQuestionnaireLine(line))
    }

    fn put_managed_list(&mut self, list: ManagedList) -> Result<(), StoreError> {
        self.stage(Mutation::PutManagedList(list))
    }

    fn put_managed_list_item(&mut self, item: ManagedListItem) -> Result<(), StoreError> {
        self.stage(Mutation::PutManagedListItem(item))
    }

    fn insert_assignment(&mut self, assignment: QuestionManagedList) -> Result<(), StoreError> {
        self.stage(Mutation::InsertAssignment(assignment))
    }

    fn insert_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError> {
        self.stage(Mutation::InsertSubset(subset))
    }

    fn update_subset(&mut self, subset: SubsetDefinition) -> Result<(), StoreError> {
        self.stage(Mutation::UpdateSubset(subset))
    }

    fn delete_subset(&mut self, id: SubsetDefinitionId) -> Result<(), StoreError> {
        self.stage(Mutation::DeleteSubset(id))
    }

    fn insert_membership(&mut self, membership: SubsetMembership) -> Result<(), StoreError> {
        self.stage(Mutation::InsertMembership(membership))
    }

    fn delete_membership(&mut self, id: SubsetMembershipId) -> Result<(), StoreError> {
        self.stage(Mutation::DeleteMembership(id))
    }

    fn raise_name_high_water(
        &mut self,
        project_id: ProjectId,
        managed_list_id: ManagedListId,
        sequence: u32,
    ) -> Result<(), StoreError> {
        self.stage(Mutation::RaiseNameHighWater {
            project_id,
            managed_list_id,
            sequence,
        })
    }

    fn insert_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError> {
        self.stage(Mutation::InsertLink(link))
    }

    fn update_link(&mut self, link: QuestionSubsetLink) -> Result<(), StoreError> {
        self.stage(Mutation::UpdateLink(link))
    }

    fn is_dirty(&self) -> bool {
        !self.staged.is_empty()
    }
}
