//! Refresh hooks
//!
//! Recomputation callbacks owned by collaborators (project summaries,
//! question display caches). Called after commit; failures are the
//! collaborator's to log and must not undo the committed change.

use async_trait::async_trait;
use subset_model::{ProjectId, SubsetDefinitionId};

/// Collaborator callbacks invoked after state changes
#[async_trait]
pub trait RefreshHooks: Send + Sync {
    /// Recompute the summary of a project
    async fn refresh_project_summary(&self, project_id: ProjectId);

    /// Recompute what the questions using a subset display
    async fn refresh_question_displays(&self, subset_definition_id: SubsetDefinitionId);
}

/// Hooks that do nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefreshHooks;

#[async_trait]
impl RefreshHooks for NoopRefreshHooks {
    async fn refresh_project_summary(&self, project_id: ProjectId) {
        tracing::trace!(project = %project_id, "project summary refresh skipped");
    }

    async fn refresh_question_displays(&self, subset_definition_id: SubsetDefinitionId) {
        tracing::trace!(subset = %subset_definition_id, "question display refresh skipped");
    }
}
