//! Replay report

use serde::Serialize;
use std::fmt::Write;
use subset_engine::{
    AssociationOutcome, DeleteSubsetResult, QuestionSelection, SaveSelectionResult, SubsetEvent,
    SubsetSummary,
};
use subset_model::ProjectStatus;

/// What one step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Saved(SaveSelectionResult),
    Associated(AssociationOutcome),
    Deleted(DeleteSubsetResult),
    Shown(QuestionSelection),
    StatusChanged { status: ProjectStatus },
    /// The engine refused the request; the store is unchanged
    Rejected { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub index: usize,
    pub description: String,
    pub outcome: StepOutcome,
}

/// Full replay result
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub project: String,
    pub steps: Vec<StepReport>,
    /// Subsets left at the end, ordered by list then sequence
    pub subsets: Vec<SubsetSummary>,
    pub events: Vec<SubsetEvent>,
}

impl ScenarioReport {
    /// Number of steps the engine rejected
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Rejected { .. }))
            .count()
    }

    /// Plain-text rendering
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Scenario: {}", self.project);
        let _ = writeln!(out);

        for step in &self.steps {
            let _ = writeln!(out, "[{:>2}] {}", step.index + 1, step.description);
            let _ = writeln!(out, "     {}", describe_outcome(&step.outcome));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "Subsets ({}):", self.subsets.len());
        for subset in &self.subsets {
            let _ = writeln!(
                out,
                "  {:<24} {:>3} member(s)  list={}",
                subset.name, subset.member_count, subset.managed_list_name
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Events: {}  Rejected steps: {}",
            self.events.len(),
            self.rejected()
        );
        out
    }
}

fn describe_outcome(outcome: &StepOutcome) -> String {
    match outcome {
        StepOutcome::Saved(saved) => match &saved.subset_name {
            Some(name) => format!("-> subset {name}"),
            None => "-> full selection".to_string(),
        },
        StepOutcome::Associated(outcome) if outcome.skipped_not_draft => {
            "-> skipped, project is not a draft".to_string()
        }
        StepOutcome::Associated(outcome) => format!(
            "-> {} link(s) created, {} subset(s) trimmed",
            outcome.links_created.len(),
            outcome.subsets_trimmed.len()
        ),
        StepOutcome::Deleted(deleted) => format!(
            "-> deleted, {} question(s) reverted to full selection",
            deleted.affected_question_ids.len()
        ),
        StepOutcome::Shown(selection) => {
            let source = selection.subset_name.as_deref().unwrap_or("full selection");
            format!("-> {} [{}]", source, selection.codes().join(", "))
        }
        StepOutcome::StatusChanged { status } => format!("-> project is {status}"),
        StepOutcome::Rejected { error } => format!("-> rejected: {error}"),
    }
}
