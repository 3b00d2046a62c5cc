//! Subset management
//!
//! Explicit, user-driven operations: saving a question's selection, reading
//! subsets and deleting them.
//!
//! # Selection normalization
//!
//! A selection equal to the list's active items is stored as a link with no
//! subset, so items added later show up on that question automatically. Any
//! other selection resolves to the subset carrying its signature, which is
//! created on first use and shared by every question that picks the same set.

use crate::config::EngineConfig;
use crate::context::{ensure_draft, hydrate_members, load_project, upsert_link, EngineContext};
use crate::error::{EngineError, Entity};
use crate::events::SubsetEvent;
use crate::types::{
    DeleteSubsetResult, ProjectSubsets, QuestionSelection, SaveSelectionRequest,
    SaveSelectionResult, SubsetDetails, SubsetMember, SubsetSummary,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use subset_model::{
    next_subset_name, parse_subset_suffix, ManagedList, ManagedListId, ManagedListItemId, Project,
    ProjectId, QuestionnaireLineId, SubsetDefinition, SubsetDefinitionId, SubsetMembership,
    SubsetSignature, UserId,
};
use subset_store::{SubsetStore, UnitOfWork};

/// Service for explicit subset operations
#[derive(Debug)]
pub struct SubsetManagementService<S> {
    ctx: EngineContext<S>,
}

impl<S> Clone for SubsetManagementService<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

/// A request that passed every precondition
struct ValidatedSelection {
    project: Project,
    list: ManagedList,
    selected: BTreeSet<ManagedListItemId>,
    is_full_selection: bool,
}

impl<S: SubsetStore> SubsetManagementService<S> {
    /// Create service over a shared context
    #[inline]
    #[must_use]
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// Save which items of a managed list a question uses
    ///
    /// # Errors
    /// - [`EngineError::ReadOnlyState`] if the project is not a draft
    /// - [`EngineError::NotFound`] if the project, question or list is missing
    /// - [`EngineError::InvalidArgument`] if the selection is empty, contains
    ///   items of another list, or the question/list belongs to another project
    /// - [`EngineError::Conflict`] if commit races were lost more often than
    ///   `conflict_retries` allows
    pub async fn save_question_selection(
        &self,
        request: SaveSelectionRequest,
    ) -> Result<SaveSelectionResult, EngineError> {
        let request = &request;
        self.ctx
            .with_conflict_retry("save_question_selection", move || {
                self.try_save_selection(request)
            })
            .await
    }

    async fn try_save_selection(
        &self,
        request: &SaveSelectionRequest,
    ) -> Result<SaveSelectionResult, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let selection = validate_selection(&tx, request)?;
        let now = Utc::now();
        let mut events = Vec::new();

        let resolved = if selection.is_full_selection {
            events.push(SubsetEvent::FullSelectionApplied {
                questionnaire_line_id: request.questionnaire_line_id,
                managed_list_id: request.managed_list_id,
            });
            None
        } else {
            Some(resolve_subset(
                &mut tx,
                &self.ctx.config,
                &selection,
                request.user_id,
                now,
                &mut events,
            )?)
        };
        let subset_id = resolved.as_ref().map(|s| s.id);

        upsert_link(
            &mut tx,
            selection.project.id,
            request.questionnaire_line_id,
            selection.list.id,
            subset_id,
            request.user_id,
            now,
        )?;

        self.ctx.store.commit(tx).await?;

        events.push(SubsetEvent::SelectionSaved {
            project_id: selection.project.id,
            questionnaire_line_id: request.questionnaire_line_id,
            managed_list_id: selection.list.id,
            is_full_selection: selection.is_full_selection,
            subset_definition_id: subset_id,
        });
        self.ctx.emit_all(&events);
        for event in &events {
            if let SubsetEvent::MembershipsRestored {
                subset_definition_id,
                ..
            } = event
            {
                self.ctx.hooks.refresh_question_displays(*subset_definition_id).await;
            }
        }

        tracing::info!(
            question = %request.questionnaire_line_id,
            list = %selection.list.name,
            full = selection.is_full_selection,
            subset = ?resolved.as_ref().map(|s| s.name.as_str()),
            "selection saved"
        );

        Ok(SaveSelectionResult {
            questionnaire_line_id: request.questionnaire_line_id,
            managed_list_id: selection.list.id,
            is_full_selection: selection.is_full_selection,
            subset_definition_id: subset_id,
            subset_name: resolved.map(|s| s.name),
        })
    }

    /// Subset with its members, or `None` if the id does not resolve
    ///
    /// # Errors
    /// Returns [`EngineError::Store`] on backend failure
    pub async fn get_subset_details(
        &self,
        subset_definition_id: SubsetDefinitionId,
    ) -> Result<Option<SubsetDetails>, EngineError> {
        let tx = self.ctx.store.begin().await?;
        let Some(subset) = tx.subset(subset_definition_id) else {
            return Ok(None);
        };
        let managed_list_name = tx
            .managed_list(subset.managed_list_id)
            .map(|l| l.name)
            .unwrap_or_default();
        let members = hydrate_members(&tx, subset.id);

        Ok(Some(SubsetDetails {
            id: subset.id,
            project_id: subset.project_id,
            managed_list_id: subset.managed_list_id,
            managed_list_name,
            name: subset.name,
            signature_hash: subset.signature_hash,
            status: subset.status,
            members,
            created_on: subset.created_on,
            created_by: subset.created_by,
        }))
    }

    /// Summaries of every subset in a project, or `None` if the project does not exist
    ///
    /// # Errors
    /// Returns [`EngineError::Store`] on backend failure
    pub async fn get_subsets_for_project(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<ProjectSubsets>, EngineError> {
        let tx = self.ctx.store.begin().await?;
        if tx.project(project_id).is_none() {
            return Ok(None);
        }

        let mut list_names: BTreeMap<ManagedListId, String> = BTreeMap::new();
        let mut subsets: Vec<SubsetSummary> = tx
            .subsets_for_project(project_id)
            .into_iter()
            .map(|subset| {
                let managed_list_name = list_names
                    .entry(subset.managed_list_id)
                    .or_insert_with(|| {
                        tx.managed_list(subset.managed_list_id)
                            .map(|l| l.name)
                            .unwrap_or_default()
                    })
                    .clone();
                SubsetSummary {
                    id: subset.id,
                    managed_list_id: subset.managed_list_id,
                    managed_list_name,
                    member_count: tx.memberships_for_subset(subset.id).len(),
                    name: subset.name,
                    created_on: subset.created_on,
                    created_by: subset.created_by,
                }
            })
            .collect();

        let separator = self.ctx.config.name_separator.as_str();
        subsets.sort_by_cached_key(|s| {
            (
                s.managed_list_name.clone(),
                parse_subset_suffix(&s.name, &s.managed_list_name, separator).unwrap_or(u32::MAX),
                s.name.clone(),
            )
        });

        Ok(Some(ProjectSubsets {
            project_id,
            subsets,
        }))
    }

    /// What a question currently shows for a list
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] if the question or list is missing
    pub async fn get_question_selection(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    ) -> Result<QuestionSelection, EngineError> {
        let tx = self.ctx.store.begin().await?;
        tx.questionnaire_line(questionnaire_line_id)
            .ok_or_else(|| EngineError::not_found(Entity::QuestionnaireLine, questionnaire_line_id))?;
        tx.managed_list(managed_list_id)
            .ok_or_else(|| EngineError::not_found(Entity::ManagedList, managed_list_id))?;

        let subset = tx
            .link(questionnaire_line_id, managed_list_id)
            .and_then(|link| link.subset_definition_id)
            .and_then(|id| tx.subset(id));

        let selection = match subset {
            Some(subset) => QuestionSelection {
                questionnaire_line_id,
                managed_list_id,
                is_full_selection: false,
                items: hydrate_members(&tx, subset.id)
                    .into_iter()
                    .filter(|m| m.is_active)
                    .collect(),
                subset_definition_id: Some(subset.id),
                subset_name: Some(subset.name),
            },
            None => QuestionSelection {
                questionnaire_line_id,
                managed_list_id,
                is_full_selection: true,
                items: tx
                    .items_for_list(managed_list_id)
                    .iter()
                    .filter(|i| i.is_active)
                    .map(SubsetMember::from)
                    .collect(),
                subset_definition_id: None,
                subset_name: None,
            },
        };
        Ok(selection)
    }

    /// Delete a subset, reverting every question that used it to full selection
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the subset does not exist
    /// - [`EngineError::ReadOnlyState`] if its project is not a draft
    pub async fn delete_subset(
        &self,
        subset_definition_id: SubsetDefinitionId,
        user_id: UserId,
    ) -> Result<DeleteSubsetResult, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let subset = tx
            .subset(subset_definition_id)
            .ok_or_else(|| EngineError::not_found(Entity::SubsetDefinition, subset_definition_id))?;
        let project = load_project(&tx, subset.project_id)?;
        ensure_draft(&project)?;

        let now = Utc::now();
        let mut affected_question_ids = Vec::new();
        for mut link in tx.links_for_subset(subset.id) {
            affected_question_ids.push(link.questionnaire_line_id);
            link.repoint(None, user_id, now);
            tx.update_link(link)?;
        }
        affected_question_ids.sort();
        tx.delete_subset(subset.id)?;

        self.ctx.store.commit(tx).await?;

        tracing::info!(
            subset = %subset.id,
            name = %subset.name,
            affected = affected_question_ids.len(),
            "subset deleted"
        );
        self.ctx.emit_all(&[SubsetEvent::SubsetDeleted {
            subset_definition_id: subset.id,
            affected_question_ids: affected_question_ids.clone(),
        }]);
        self.ctx.hooks.refresh_project_summary(project.id).await;

        Ok(DeleteSubsetResult {
            subset_definition_id: subset.id,
            affected_question_ids,
        })
    }
}

fn validate_selection(
    tx: &impl UnitOfWork,
    request: &SaveSelectionRequest,
) -> Result<ValidatedSelection, EngineError> {
    let project = load_project(tx, request.project_id)?;
    ensure_draft(&project)?;

    let line = tx
        .questionnaire_line(request.questionnaire_line_id)
        .ok_or_else(|| {
            EngineError::not_found(Entity::QuestionnaireLine, request.questionnaire_line_id)
        })?;
    if line.project_id != project.id {
        return Err(EngineError::invalid(format!(
            "question {} does not belong to project {}",
            line.id, project.id
        )));
    }

    let list = tx
        .managed_list(request.managed_list_id)
        .ok_or_else(|| EngineError::not_found(Entity::ManagedList, request.managed_list_id))?;
    if list.project_id != project.id {
        return Err(EngineError::invalid(format!(
            "managed list {} does not belong to project {}",
            list.id, project.id
        )));
    }

    let selected: BTreeSet<ManagedListItemId> = request.selected_item_ids.iter().copied().collect();
    if selected.is_empty() {
        return Err(EngineError::invalid("selection must contain at least one item"));
    }

    let items = tx.items_for_list(list.id);
    let known: BTreeSet<ManagedListItemId> = items.iter().map(|i| i.id).collect();
    let foreign: Vec<String> = selected
        .difference(&known)
        .map(ToString::to_string)
        .collect();
    if !foreign.is_empty() {
        return Err(EngineError::invalid(format!(
            "items [{}] do not belong to managed list {}",
            foreign.join(", "),
            list.id
        )));
    }

    let active: BTreeSet<ManagedListItemId> =
        items.iter().filter(|i| i.is_active).map(|i| i.id).collect();
    let is_full_selection = selected == active;

    Ok(ValidatedSelection {
        project,
        list,
        selected,
        is_full_selection,
    })
}

/// Find the subset carrying the selection's signature, or create it
fn resolve_subset(
    tx: &mut impl UnitOfWork,
    config: &EngineConfig,
    selection: &ValidatedSelection,
    user_id: UserId,
    now: DateTime<Utc>,
    events: &mut Vec<SubsetEvent>,
) -> Result<SubsetDefinition, EngineError> {
    let project_id = selection.project.id;
    let list_id = selection.list.id;
    let signature = SubsetSignature::build(selection.selected.iter().copied())?;

    if let Some(mut existing) = tx.subset_by_signature(project_id, list_id, &signature) {
        tracing::debug!(subset = %existing.id, signature = %signature.short(), "reusing subset");
        events.push(SubsetEvent::SubsetReused {
            subset_definition_id: existing.id,
            name: existing.name.clone(),
        });
        sync_memberships(tx, &mut existing, &selection.selected, user_id, now, events)?;
        return Ok(existing);
    }

    let scope = tx.subsets_for_scope(project_id, list_id);
    let next = next_subset_name(
        &selection.list.name,
        &config.name_separator,
        scope.iter().map(|s| s.name.as_str()),
        tx.name_high_water(project_id, list_id),
    );

    let subset = SubsetDefinition::new(project_id, list_id, next.name, signature, user_id, now);
    tx.insert_subset(subset.clone())?;
    for item_id in &selection.selected {
        tx.insert_membership(SubsetMembership::new(subset.id, *item_id))?;
    }
    tx.raise_name_high_water(project_id, list_id, next.sequence)?;

    events.push(SubsetEvent::SubsetCreated {
        subset_definition_id: subset.id,
        name: subset.name.clone(),
        signature,
        member_count: selection.selected.len(),
    });
    Ok(subset)
}

/// Bring a reused subset's membership rows back in line with its signature
///
/// A pinned signature outlives deactivation trims, so the rows can lag the
/// set the signature was built from. The selection that matched the
/// signature is that set.
fn sync_memberships(
    tx: &mut impl UnitOfWork,
    subset: &mut SubsetDefinition,
    selected: &BTreeSet<ManagedListItemId>,
    user_id: UserId,
    now: DateTime<Utc>,
    events: &mut Vec<SubsetEvent>,
) -> Result<(), EngineError> {
    let current = tx.memberships_for_subset(subset.id);
    let present: BTreeSet<ManagedListItemId> =
        current.iter().map(|m| m.managed_list_item_id).collect();

    let restored: Vec<ManagedListItemId> = selected.difference(&present).copied().collect();
    let stale: Vec<_> = current
        .iter()
        .filter(|m| !selected.contains(&m.managed_list_item_id))
        .collect();
    if restored.is_empty() && stale.is_empty() {
        return Ok(());
    }

    for membership in &stale {
        tx.delete_membership(membership.id)?;
    }
    for item_id in &restored {
        tx.insert_membership(SubsetMembership::new(subset.id, *item_id))?;
    }
    subset.touch(user_id, now);
    tx.update_subset(subset.clone())?;

    tracing::info!(
        subset = %subset.id,
        name = %subset.name,
        restored = restored.len(),
        dropped = stale.len(),
        "subset members resynced with signature"
    );
    events.push(SubsetEvent::MembershipsRestored {
        subset_definition_id: subset.id,
        managed_list_item_ids: restored,
    });
    Ok(())
}
