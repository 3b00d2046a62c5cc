//! Shared service context and helpers

use crate::config::EngineConfig;
use crate::error::{EngineError, Entity};
use crate::events::{EventSink, SubsetEvent, TracingEventSink};
use crate::hooks::{NoopRefreshHooks, RefreshHooks};
use crate::types::SubsetMember;
use chrono::{DateTime, Utc};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use subset_model::{
    ManagedListId, Project, ProjectId, QuestionSubsetLink, QuestionnaireLineId,
    SubsetDefinitionId, UserId,
};
use subset_store::{SubsetStore, UnitOfWork};

/// Store, configuration and collaborator handles shared by both services
pub struct EngineContext<S> {
    pub(crate) store: Arc<S>,
    pub(crate) config: EngineConfig,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) hooks: Arc<dyn RefreshHooks>,
}

impl<S> Clone for EngineContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            events: Arc::clone(&self.events),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<S> fmt::Debug for EngineContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: SubsetStore> EngineContext<S> {
    /// Create context with default config, tracing events and no-op hooks
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
            events: Arc::new(TracingEventSink),
            hooks: Arc::new(NoopRefreshHooks),
        }
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// With event sink
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// With refresh hooks
    #[must_use]
    pub fn with_refresh_hooks(mut self, hooks: Arc<dyn RefreshHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn emit_all(&self, events: &[SubsetEvent]) {
        for event in events {
            self.events.emit(event);
        }
    }

    /// Run `op` again while it fails with a retryable conflict, up to the configured limit
    pub(crate) async fn with_conflict_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        mut op: F,
    ) -> Result<T, EngineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.config.conflict_retries => {
                    attempt += 1;
                    tracing::warn!(operation, attempt, error = %err, "retrying after commit conflict");
                    self.events.emit(&SubsetEvent::ConflictRetried {
                        attempt,
                        detail: err.to_string(),
                    });
                }
                result => return result,
            }
        }
    }
}

/// Reject writes against non-draft projects
pub(crate) fn ensure_draft(project: &Project) -> Result<(), EngineError> {
    if project.status.is_draft() {
        Ok(())
    } else {
        Err(EngineError::ReadOnlyState {
            project_id: project.id,
            status: project.status,
        })
    }
}

pub(crate) fn load_project(tx: &impl UnitOfWork, id: ProjectId) -> Result<Project, EngineError> {
    tx.project(id)
        .ok_or_else(|| EngineError::not_found(Entity::Project, id))
}

/// Point the (question, list) link at `subset`, creating the link if absent
///
/// Returns `true` when a new link was inserted.
pub(crate) fn upsert_link(
    tx: &mut impl UnitOfWork,
    project_id: ProjectId,
    questionnaire_line_id: QuestionnaireLineId,
    managed_list_id: ManagedListId,
    subset: Option<SubsetDefinitionId>,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    if let Some(mut link) = tx.link(questionnaire_line_id, managed_list_id) {
        link.repoint(subset, user_id, now);
        tx.update_link(link)?;
        Ok(false)
    } else {
        tx.insert_link(QuestionSubsetLink::new(
            project_id,
            questionnaire_line_id,
            managed_list_id,
            subset,
            user_id,
            now,
        ))?;
        Ok(true)
    }
}

/// Members of a subset hydrated from their items, by sort order then code
pub(crate) fn hydrate_members(
    tx: &impl UnitOfWork,
    subset_definition_id: SubsetDefinitionId,
) -> Vec<SubsetMember> {
    let mut members: Vec<SubsetMember> = tx
        .memberships_for_subset(subset_definition_id)
        .iter()
        .filter_map(|m| tx.managed_list_item(m.managed_list_item_id))
        .map(|item| SubsetMember::from(&item))
        .collect();
    members.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.code.cmp(&b.code))
    });
    members
}
