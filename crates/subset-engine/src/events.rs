//! Domain events
//!
//! Services describe what they did as [`SubsetEvent`] values and hand them to
//! an injected [`EventSink`]. Events are emitted only after the owning unit
//! of work has committed.

use serde::Serialize;
use subset_model::{
    ManagedListId, ManagedListItemId, ProjectId, ProjectStatus, QuestionnaireLineId,
    SubsetDefinitionId, SubsetSignature,
};

/// Lifecycle callback that produced an auto-association event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ItemCreated,
    ItemDeactivated,
    ItemReactivated,
    ListAssigned,
}

/// Something the engine did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SubsetEvent {
    /// A question selection was saved
    SelectionSaved {
        project_id: ProjectId,
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        is_full_selection: bool,
        subset_definition_id: Option<SubsetDefinitionId>,
    },
    /// A new subset was materialized
    SubsetCreated {
        subset_definition_id: SubsetDefinitionId,
        name: String,
        signature: SubsetSignature,
        member_count: usize,
    },
    /// An existing subset matched the selection's signature
    SubsetReused {
        subset_definition_id: SubsetDefinitionId,
        name: String,
    },
    /// The selection covered every active item, so no subset is used
    FullSelectionApplied {
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
    },
    /// A full-selection link was created by a lifecycle callback
    LinkCreated {
        questionnaire_line_id: QuestionnaireLineId,
        managed_list_id: ManagedListId,
        trigger: Trigger,
    },
    /// A lifecycle callback did nothing because the project is not a draft
    LinkSkippedNotDraft {
        project_id: ProjectId,
        status: ProjectStatus,
        trigger: Trigger,
    },
    /// A deactivated item was removed from a subset
    MembershipTrimmed {
        subset_definition_id: SubsetDefinitionId,
        managed_list_item_id: ManagedListItemId,
    },
    /// A reused subset got its members resynced with its signature
    MembershipsRestored {
        subset_definition_id: SubsetDefinitionId,
        managed_list_item_ids: Vec<ManagedListItemId>,
    },
    /// A trimmed subset was re-signed over its remaining members
    SignatureRecomputed {
        subset_definition_id: SubsetDefinitionId,
        previous: SubsetSignature,
        current: SubsetSignature,
    },
    /// A trimmed subset became identical to another and was folded into it
    SubsetsMerged {
        retired: SubsetDefinitionId,
        survivor: SubsetDefinitionId,
        repointed_question_ids: Vec<QuestionnaireLineId>,
    },
    /// A subset was deleted and its links reverted to full selection
    SubsetDeleted {
        subset_definition_id: SubsetDefinitionId,
        affected_question_ids: Vec<QuestionnaireLineId>,
    },
    /// A save lost a uniqueness race and is being re-run
    ConflictRetried { attempt: u32, detail: String },
}

impl SubsetEvent {
    /// Stable event name
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SelectionSaved { .. } => "selection_saved",
            Self::SubsetCreated { .. } => "subset_created",
            Self::SubsetReused { .. } => "subset_reused",
            Self::FullSelectionApplied { .. } => "full_selection_applied",
            Self::LinkCreated { .. } => "link_created",
            Self::LinkSkippedNotDraft { .. } => "link_skipped_not_draft",
            Self::MembershipTrimmed { .. } => "membership_trimmed",
            Self::MembershipsRestored { .. } => "memberships_restored",
            Self::SignatureRecomputed { .. } => "signature_recomputed",
            Self::SubsetsMerged { .. } => "subsets_merged",
            Self::SubsetDeleted { .. } => "subset_deleted",
            Self::ConflictRetried { .. } => "conflict_retried",
        }
    }
}

/// Receiver of domain events
pub trait EventSink: Send + Sync {
    /// Handle one event
    fn emit(&self, event: &SubsetEvent);
}

/// Sink that writes every event as a structured `tracing` record
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &SubsetEvent) {
        match event {
            SubsetEvent::SubsetCreated {
                subset_definition_id,
                name,
                signature,
                member_count,
            } => tracing::info!(
                target: "subset_engine::events",
                event = event.kind(),
                subset = %subset_definition_id,
                name = %name,
                signature = %signature.short(),
                member_count,
            ),
            SubsetEvent::SubsetReused {
                subset_definition_id,
                name,
            } => tracing::info!(
                target: "subset_engine::events",
                event = event.kind(),
                subset = %subset_definition_id,
                name = %name,
            ),
            SubsetEvent::LinkSkippedNotDraft {
                project_id,
                status,
                trigger,
            } => tracing::debug!(
                target: "subset_engine::events",
                event = event.kind(),
                project = %project_id,
                status = %status,
                trigger = ?trigger,
            ),
            SubsetEvent::ConflictRetried { attempt, detail } => tracing::warn!(
                target: "subset_engine::events",
                event = event.kind(),
                attempt,
                detail = %detail,
            ),
            other => tracing::info!(
                target: "subset_engine::events",
                event = other.kind(),
                detail = ?other,
            ),
        }
    }
}

/// Sink that drops every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &SubsetEvent) {}
}
