//! Auto-association
//!
//! Reacts to item lifecycle and list assignment callbacks so what each
//! question shows stays consistent with its list. Every handler is gated on
//! the owning project being a draft; published projects are never touched,
//! and a gated callback is a logged no-op rather than an error.
//!
//! Handlers are idempotent: links and memberships that already exist are
//! detected and left alone, so replaying a callback changes nothing.

use crate::config::SignatureOnTrim;
use crate::context::{load_project, EngineContext};
use crate::error::{EngineError, Entity};
use crate::events::{SubsetEvent, Trigger};
use crate::types::AssociationOutcome;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use subset_model::{
    ManagedList, ManagedListId, ManagedListItem, ManagedListItemId, Project, ProjectId,
    QuestionSubsetLink, QuestionnaireLineId, SubsetDefinitionId, SubsetSignature, UserId,
};
use subset_store::{SubsetStore, UnitOfWork};

/// Service reacting to list lifecycle callbacks
#[derive(Debug)]
pub struct AutoAssociationService<S> {
    ctx: EngineContext<S>,
}

impl<S> Clone for AutoAssociationService<S> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
        }
    }
}

impl<S: SubsetStore> AutoAssociationService<S> {
    /// Create service over a shared context
    #[inline]
    #[must_use]
    pub fn new(ctx: EngineContext<S>) -> Self {
        Self { ctx }
    }

    /// A new item was added to a list
    ///
    /// Questions assigned to the list without a link get a full-selection
    /// link. Questions pinned to a subset keep it unchanged: new items are
    /// never injected into a hand-picked subset.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] if the item, its list or project is missing
    pub async fn on_managed_list_item_created(
        &self,
        managed_list_item_id: ManagedListItemId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.ctx
            .with_conflict_retry("on_managed_list_item_created", move || {
                self.associate_item(managed_list_item_id, user_id, Trigger::ItemCreated)
            })
            .await
    }

    /// A previously deactivated item was reactivated; handled exactly like creation
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] if the item, its list or project is missing
    pub async fn on_managed_list_item_reactivated(
        &self,
        managed_list_item_id: ManagedListItemId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.ctx
            .with_conflict_retry("on_managed_list_item_reactivated", move || {
                self.associate_item(managed_list_item_id, user_id, Trigger::ItemReactivated)
            })
            .await
    }

    /// An item was deactivated; remove it from every draft subset containing it
    ///
    /// With [`SignatureOnTrim::Pinned`] the subset keeps its original
    /// signature. With [`SignatureOnTrim::Recompute`] it is re-signed and, if
    /// that signature already belongs to another subset, merged into it.
    ///
    /// # Errors
    /// Returns [`EngineError::NotFound`] if the item, its list or project is missing
    pub async fn on_managed_list_item_deactivated(
        &self,
        managed_list_item_id: ManagedListItemId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.ctx
            .with_conflict_retry("on_managed_list_item_deactivated", move || {
                self.trim_item(managed_list_item_id, user_id)
            })
            .await
    }

    /// A list was wired to a question; default the question to full selection
    ///
    /// # Errors
    /// - [`EngineError::NotFound`] if the question, its project or the list is missing
    /// - [`EngineError::InvalidArgument`] if the list belongs to another project
    pub async fn on_managed_list_assigned_to_question(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.ctx
            .with_conflict_retry("on_managed_list_assigned_to_question", move || {
                self.link_assignment(questionnaire_line_id, managed_list_id, user_id)
            })
            .await
    }

    async fn associate_item(
        &self,
        item_id: ManagedListItemId,
        user_id: UserId,
        trigger: Trigger,
    ) -> Result<AssociationOutcome, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let (item, list, project) = resolve_item_scope(&tx, item_id)?;
        if !project.status.is_draft() {
            return Ok(self.skip(&project, trigger));
        }

        let now = Utc::now();
        let mut links_created = Vec::new();
        let mut projects = BTreeSet::new();
        for assignment in tx.assignments_for_list(list.id) {
            let Some(line) = tx.questionnaire_line(assignment.questionnaire_line_id) else {
                continue;
            };
            let draft = tx
                .project(line.project_id)
                .is_some_and(|p| p.status.is_draft());
            if !draft {
                continue;
            }
            projects.insert(line.project_id);

            if tx.link(line.id, list.id).is_none() {
                tx.insert_link(QuestionSubsetLink::new(
                    line.project_id,
                    line.id,
                    list.id,
                    None,
                    user_id,
                    now,
                ))?;
                links_created.push(line.id);
            }
        }

        self.ctx.store.commit(tx).await?;

        let events: Vec<SubsetEvent> = links_created
            .iter()
            .map(|line_id| SubsetEvent::LinkCreated {
                questionnaire_line_id: *line_id,
                managed_list_id: list.id,
                trigger,
            })
            .collect();
        self.ctx.emit_all(&events);

        let refreshed_projects = self.refresh_projects(projects).await;
        tracing::info!(
            item = %item.id,
            code = %item.code,
            list = %list.name,
            ?trigger,
            links_created = links_created.len(),
            "item associated"
        );

        Ok(AssociationOutcome {
            skipped_not_draft: false,
            links_created,
            subsets_trimmed: Vec::new(),
            refreshed_projects,
        })
    }

    async fn trim_item(
        &self,
        item_id: ManagedListItemId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let (item, _list, project) = resolve_item_scope(&tx, item_id)?;
        if !project.status.is_draft() {
            return Ok(self.skip(&project, Trigger::ItemDeactivated));
        }

        let now = Utc::now();
        let mut events = Vec::new();
        let mut trimmed = Vec::new();
        let mut projects = BTreeSet::new();
        for membership in tx.memberships_for_item(item.id) {
            let Some(subset) = tx.subset(membership.subset_definition_id) else {
                continue;
            };
            let draft = tx
                .project(subset.project_id)
                .is_some_and(|p| p.status.is_draft());
            if !draft {
                continue;
            }

            tx.delete_membership(membership.id)?;
            trimmed.push(subset.id);
            projects.insert(subset.project_id);
            events.push(SubsetEvent::MembershipTrimmed {
                subset_definition_id: subset.id,
                managed_list_item_id: item.id,
            });
        }

        let mut displays: BTreeSet<SubsetDefinitionId> = BTreeSet::new();
        for subset_id in &trimmed {
            let carrier = match self.ctx.config.signature_on_trim {
                SignatureOnTrim::Pinned => *subset_id,
                SignatureOnTrim::Recompute => {
                    resign_trimmed(&mut tx, *subset_id, user_id, now, &mut events)?
                }
            };
            displays.insert(carrier);
        }

        self.ctx.store.commit(tx).await?;
        self.ctx.emit_all(&events);

        for subset_id in &displays {
            self.ctx.hooks.refresh_question_displays(*subset_id).await;
        }
        let refreshed_projects = self.refresh_projects(projects).await;
        tracing::info!(
            item = %item.id,
            code = %item.code,
            subsets = trimmed.len(),
            policy = ?self.ctx.config.signature_on_trim,
            "item trimmed from subsets"
        );

        Ok(AssociationOutcome {
            skipped_not_draft: false,
            links_created: Vec::new(),
            subsets_trimmed: trimmed,
            refreshed_projects,
        })
    }

    async fn link_assignment(
        &self,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        user_id: UserId,
    ) -> Result<AssociationOutcome, EngineError> {
        let mut tx = self.ctx.store.begin().await?;
        let line = tx
            .questionnaire_line(questionnaire_line_id)
            .ok_or_else(|| EngineError::not_found(Entity::QuestionnaireLine, questionnaire_line_id))?;
        let project = load_project(&tx, line.project_id)?;
        if !project.status.is_draft() {
            return Ok(self.skip(&project, Trigger::ListAssigned));
        }
        let list = tx
            .managed_list(managed_list_id)
            .ok_or_else(|| EngineError::not_found(Entity::ManagedList, managed_list_id))?;
        if list.project_id != project.id {
            return Err(EngineError::invalid(format!(
                "managed list {} does not belong to project {}",
                list.id, project.id
            )));
        }

        let mut links_created = Vec::new();
        if tx.link(line.id, list.id).is_none() {
            tx.insert_link(QuestionSubsetLink::new(
                project.id,
                line.id,
                list.id,
                None,
                user_id,
                Utc::now(),
            ))?;
            links_created.push(line.id);
        }

        self.ctx.store.commit(tx).await?;

        if !links_created.is_empty() {
            self.ctx.emit_all(&[SubsetEvent::LinkCreated {
                questionnaire_line_id: line.id,
                managed_list_id: list.id,
                trigger: Trigger::ListAssigned,
            }]);
        }
        let refreshed_projects = self.refresh_projects([project.id]).await;
        tracing::debug!(
            question = %line.id,
            list = %list.name,
            created = !links_created.is_empty(),
            "list assignment linked"
        );

        Ok(AssociationOutcome {
            skipped_not_draft: false,
            links_created,
            subsets_trimmed: Vec::new(),
            refreshed_projects,
        })
    }

    fn skip(&self, project: &Project, trigger: Trigger) -> AssociationOutcome {
        tracing::info!(
            project = %project.id,
            status = %project.status,
            ?trigger,
            "project is not a draft; auto-association skipped"
        );
        self.ctx.emit_all(&[SubsetEvent::LinkSkippedNotDraft {
            project_id: project.id,
            status: project.status,
            trigger,
        }]);
        AssociationOutcome::skipped()
    }

    async fn refresh_projects(
        &self,
        projects: impl IntoIterator<Item = ProjectId>,
    ) -> Vec<ProjectId> {
        let mut refreshed = Vec::new();
        for project_id in projects {
            self.ctx.hooks.refresh_project_summary(project_id).await;
            refreshed.push(project_id);
        }
        refreshed
    }
}

fn resolve_item_scope(
    tx: &impl UnitOfWork,
    item_id: ManagedListItemId,
) -> Result<(ManagedListItem, ManagedList, Project), EngineError> {
    let item = tx
        .managed_list_item(item_id)
        .ok_or_else(|| EngineError::not_found(Entity::ManagedListItem, item_id))?;
    let list = tx
        .managed_list(item.managed_list_id)
        .ok_or_else(|| EngineError::not_found(Entity::ManagedList, item.managed_list_id))?;
    let project = load_project(tx, list.project_id)?;
    Ok((item, list, project))
}

/// Re-sign a trimmed subset over its remaining members
///
/// Returns the subset that now carries the trimmed subset's questions: the
/// subset itself, or the existing subset it was merged into.
fn resign_trimmed(
    tx: &mut impl UnitOfWork,
    subset_id: SubsetDefinitionId,
    user_id: UserId,
    now: DateTime<Utc>,
    events: &mut Vec<SubsetEvent>,
) -> Result<SubsetDefinitionId, EngineError> {
    let Some(mut subset) = tx.subset(subset_id) else {
        return Ok(subset_id);
    };
    let remaining: Vec<ManagedListItemId> = tx
        .memberships_for_subset(subset_id)
        .iter()
        .map(|m| m.managed_list_item_id)
        .collect();
    if remaining.is_empty() {
        tracing::warn!(
            subset = %subset.id,
            name = %subset.name,
            "trim left subset without members; signature kept"
        );
        return Ok(subset_id);
    }

    let signature = SubsetSignature::build(remaining)?;
    if signature == subset.signature_hash {
        return Ok(subset_id);
    }

    if let Some(survivor) =
        tx.subset_by_signature(subset.project_id, subset.managed_list_id, &signature)
    {
        let mut repointed_question_ids = Vec::new();
        for mut link in tx.links_for_subset(subset_id) {
            repointed_question_ids.push(link.questionnaire_line_id);
            link.repoint(Some(survivor.id), user_id, now);
            tx.update_link(link)?;
        }
        tx.delete_subset(subset_id)?;
        tracing::info!(
            retired = %subset.name,
            survivor = %survivor.name,
            repointed = repointed_question_ids.len(),
            "trimmed subset merged"
        );
        events.push(SubsetEvent::SubsetsMerged {
            retired: subset_id,
            survivor: survivor.id,
            repointed_question_ids,
        });
        return Ok(survivor.id);
    }

    let previous = subset.signature_hash;
    subset.signature_hash = signature;
    subset.touch(user_id, now);
    tx.update_subset(subset)?;
    events.push(SubsetEvent::SignatureRecomputed {
        subset_definition_id: subset_id,
        previous,
        current: signature,
    });
    Ok(subset_id)
}
