//! Scenario files
//!
//! A scenario seeds one project with questions, managed lists and list
//! assignments, then replays a sequence of selection saves and list
//! lifecycle changes against an in-memory store.

use crate::report::{ScenarioReport, StepOutcome, StepReport};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use subset_engine::{
    AutoAssociationService, EngineConfig, EngineContext, EngineError, EventSink,
    SaveSelectionRequest, SubsetEvent, SubsetManagementService, TracingEventSink,
};
use subset_model::{
    ManagedList, ManagedListItem, ManagedListItemId, Project, ProjectStatus, QuestionManagedList,
    QuestionnaireLine, UserId,
};
use subset_store::{InMemoryStore, StoreError, SubsetStore, UnitOfWork};

/// Scenario failures that stop a replay
///
/// Engine rejections (read-only project, invalid selection) are recorded as
/// step outcomes instead.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("failed to read scenario {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown question {0:?}")]
    UnknownQuestion(String),

    #[error("unknown managed list {0:?}")]
    UnknownList(String),

    #[error("managed list {list:?} has no item {code:?}")]
    UnknownItem { list: String, code: String },

    #[error("managed list {list:?} has no subset named {name:?}")]
    UnknownSubset { list: String, name: String },

    #[error("duplicate {kind} {name:?}")]
    Duplicate { kind: &'static str, name: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("step {index} failed: {source}")]
    Engine {
        index: usize,
        #[source]
        source: EngineError,
    },
}

/// Project under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSpec {
    pub name: String,
    #[serde(default = "default_status")]
    pub status: ProjectStatus,
}

fn default_status() -> ProjectStatus {
    ProjectStatus::Draft
}

/// Managed list with its items, in display order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub items: Vec<ItemSpec>,
}

/// Item given either as a bare code or with a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemSpec {
    Code(String),
    Labeled { code: String, label: String },
}

impl ItemSpec {
    fn code(&self) -> &str {
        match self {
            Self::Code(code) | Self::Labeled { code, .. } => code,
        }
    }

    fn label(&self) -> &str {
        match self {
            Self::Code(code) => code,
            Self::Labeled { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSpec {
    pub question: String,
    pub list: String,
}

/// One replayed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Step {
    /// Save a question's selection
    Save {
        question: String,
        list: String,
        items: Vec<String>,
    },
    /// Add an item to a list and notify the engine
    CreateItem {
        list: String,
        code: String,
        #[serde(default)]
        label: Option<String>,
    },
    /// Deactivate an item and notify the engine
    DeactivateItem { list: String, code: String },
    /// Reactivate an item and notify the engine
    ReactivateItem { list: String, code: String },
    /// Wire a list to a question and notify the engine
    Assign { question: String, list: String },
    /// Delete a subset by name
    DeleteSubset { list: String, name: String },
    /// Move the project to another lifecycle status
    SetStatus { status: ProjectStatus },
    /// Record what a question currently shows
    Show { question: String, list: String },
}

impl Step {
    /// Short human-readable description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Save { question, list, items } => {
                format!("save {question}/{list} [{}]", items.join(", "))
            }
            Self::CreateItem { list, code, .. } => format!("create item {list}/{code}"),
            Self::DeactivateItem { list, code } => format!("deactivate item {list}/{code}"),
            Self::ReactivateItem { list, code } => format!("reactivate item {list}/{code}"),
            Self::Assign { question, list } => format!("assign {list} to {question}"),
            Self::DeleteSubset { name, .. } => format!("delete subset {name}"),
            Self::SetStatus { status } => format!("set project status {status}"),
            Self::Show { question, list } => format!("show {question}/{list}"),
        }
    }
}

/// Parsed scenario file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub project: ProjectSpec,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub lists: Vec<ListSpec>,
    #[serde(default)]
    pub assignments: Vec<AssignmentSpec>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse from YAML
    ///
    /// # Errors
    /// Returns [`ScenarioError::Parse`] if the YAML does not describe a scenario
    pub fn from_yaml_str(s: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(s)?)
    }

    /// Read and parse a scenario file
    ///
    /// # Errors
    /// Returns [`ScenarioError::Io`] or [`ScenarioError::Parse`]
    pub fn load(path: &Path) -> Result<Self, ScenarioError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScenarioError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }
}

/// Event sink that logs through `tracing` and keeps a copy for the report
#[derive(Debug, Default)]
struct ReplaySink {
    events: Mutex<Vec<SubsetEvent>>,
}

impl EventSink for ReplaySink {
    fn emit(&self, event: &SubsetEvent) {
        TracingEventSink.emit(event);
        self.events.lock().push(event.clone());
    }
}

struct SeededList {
    list: ManagedList,
    items: BTreeMap<String, ManagedListItem>,
    next_sort_order: i32,
}

/// Replay state: seeded rows by scenario name plus both services
struct Replay {
    store: Arc<InMemoryStore>,
    sink: Arc<ReplaySink>,
    management: SubsetManagementService<InMemoryStore>,
    association: AutoAssociationService<InMemoryStore>,
    user: UserId,
    project: Project,
    questions: BTreeMap<String, QuestionnaireLine>,
    lists: BTreeMap<String, SeededList>,
}

/// Seed the scenario and replay its steps
///
/// # Errors
/// Returns [`ScenarioError`] if the scenario references unknown names or a
/// store/engine failure other than a rejected request occurs
pub async fn run(scenario: &Scenario, config: EngineConfig) -> Result<ScenarioReport, ScenarioError> {
    let mut replay = Replay::seed(scenario, config).await?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let outcome = replay.apply(index, step).await?;
        tracing::debug!(index, step = %step.describe(), "step replayed");
        steps.push(StepReport {
            index,
            description: step.describe(),
            outcome,
        });
    }

    let subsets = replay
        .management
        .get_subsets_for_project(replay.project.id)
        .await
        .map_err(|source| ScenarioError::Engine {
            index: scenario.steps.len(),
            source,
        })?
        .map(|p| p.subsets)
        .unwrap_or_default();
    let events = replay.sink.events.lock().clone();

    Ok(ScenarioReport {
        project: replay.project.name,
        steps,
        subsets,
        events,
    })
}

impl Replay {
    async fn seed(scenario: &Scenario, config: EngineConfig) -> Result<Self, ScenarioError> {
        let store = Arc::new(InMemoryStore::new());
        let sink = Arc::new(ReplaySink::default());
        let ctx = EngineContext::new(Arc::clone(&store))
            .with_config(config)
            .with_event_sink(sink.clone());
        let user = UserId::new();
        let project = Project::new(&scenario.project.name, scenario.project.status);

        let mut tx = store.begin().await?;
        tx.put_project(project.clone())?;

        let mut questions = BTreeMap::new();
        for name in &scenario.questions {
            let line = QuestionnaireLine::new(project.id, name);
            tx.put_questionnaire_line(line.clone())?;
            if questions.insert(name.clone(), line).is_some() {
                return Err(ScenarioError::Duplicate {
                    kind: "question",
                    name: name.clone(),
                });
            }
        }

        let mut lists = BTreeMap::new();
        for spec in &scenario.lists {
            let mut list = ManagedList::new(project.id, &spec.name);
            if let Some(description) = &spec.description {
                list = list.with_description(description);
            }
            tx.put_managed_list(list.clone())?;

            let mut items = BTreeMap::new();
            let mut sort_order = 0;
            for item_spec in &spec.items {
                sort_order += 1;
                let item = ManagedListItem::new(list.id, item_spec.code(), item_spec.label(), sort_order);
                tx.put_managed_list_item(item.clone())?;
                if items.insert(item.code.clone(), item).is_some() {
                    return Err(ScenarioError::Duplicate {
                        kind: "item",
                        name: item_spec.code().to_string(),
                    });
                }
            }
            lists.insert(
                spec.name.clone(),
                SeededList {
                    list,
                    items,
                    next_sort_order: sort_order + 1,
                },
            );
        }
        store.commit(tx).await?;

        let replay = Self {
            management: SubsetManagementService::new(ctx.clone()),
            association: AutoAssociationService::new(ctx),
            store,
            sink,
            user,
            project,
            questions,
            lists,
        };

        for assignment in &scenario.assignments {
            replay
                .assign(&assignment.question, &assignment.list)
                .await
                .map_err(|source| match source {
                    AssignError::Scenario(err) => err,
                    AssignError::Engine(source) => ScenarioError::Engine { index: 0, source },
                })?;
        }
        Ok(replay)
    }

    async fn apply(&mut self, index: usize, step: &Step) -> Result<StepOutcome, ScenarioError> {
        let result = match step {
            Step::Save { question, list, items } => {
                let line = self.question(question)?.id;
                let seeded = self.list(list)?;
                let selected = items
                    .iter()
                    .map(|code| item_id(seeded, code))
                    .collect::<Result<Vec<_>, _>>()?;
                let request = SaveSelectionRequest::new(
                    self.project.id,
                    line,
                    seeded.list.id,
                    selected,
                    self.user,
                );
                self.management
                    .save_question_selection(request)
                    .await
                    .map(StepOutcome::Saved)
            }
            Step::CreateItem { list, code, label } => {
                let item = self.create_item(list, code, label.as_deref()).await?;
                self.association
                    .on_managed_list_item_created(item, self.user)
                    .await
                    .map(StepOutcome::Associated)
            }
            Step::DeactivateItem { list, code } => {
                let item = self.set_item_active(list, code, false).await?;
                self.association
                    .on_managed_list_item_deactivated(item, self.user)
                    .await
                    .map(StepOutcome::Associated)
            }
            Step::ReactivateItem { list, code } => {
                let item = self.set_item_active(list, code, true).await?;
                self.association
                    .on_managed_list_item_reactivated(item, self.user)
                    .await
                    .map(StepOutcome::Associated)
            }
            Step::Assign { question, list } => match self.assign(question, list).await {
                Ok(outcome) => Ok(StepOutcome::Associated(outcome)),
                Err(AssignError::Engine(err)) => Err(err),
                Err(AssignError::Scenario(err)) => return Err(err),
            },
            Step::DeleteSubset { list, name } => {
                let subset_id = self.subset_id(list, name).await?;
                self.management
                    .delete_subset(subset_id, self.user)
                    .await
                    .map(StepOutcome::Deleted)
            }
            Step::SetStatus { status } => {
                self.project.status = *status;
                let mut tx = self.store.begin().await?;
                tx.put_project(self.project.clone())?;
                self.store.commit(tx).await?;
                Ok(StepOutcome::StatusChanged { status: *status })
            }
            Step::Show { question, list } => {
                let line = self.question(question)?.id;
                let list_id = self.list(list)?.list.id;
                self.management
                    .get_question_selection(line, list_id)
                    .await
                    .map(StepOutcome::Shown)
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(err @ (EngineError::ReadOnlyState { .. } | EngineError::InvalidArgument(_))) => {
                tracing::info!(index, error = %err, "step rejected");
                Ok(StepOutcome::Rejected {
                    error: err.to_string(),
                })
            }
            Err(source) => Err(ScenarioError::Engine { index, source }),
        }
    }

    fn question(&self, name: &str) -> Result<&QuestionnaireLine, ScenarioError> {
        self.questions
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownQuestion(name.to_string()))
    }

    fn list(&self, name: &str) -> Result<&SeededList, ScenarioError> {
        self.lists
            .get(name)
            .ok_or_else(|| ScenarioError::UnknownList(name.to_string()))
    }

    async fn assign(
        &self,
        question: &str,
        list: &str,
    ) -> Result<subset_engine::AssociationOutcome, AssignError> {
        let line = self.question(question)?.id;
        let list_id = self.list(list)?.list.id;

        let mut tx = self.store.begin().await.map_err(ScenarioError::from)?;
        if tx.assignment(line, list_id).is_none() {
            tx.insert_assignment(QuestionManagedList::new(line, list_id, self.user, Utc::now()))
                .map_err(ScenarioError::from)?;
        }
        self.store.commit(tx).await.map_err(ScenarioError::from)?;

        self.association
            .on_managed_list_assigned_to_question(line, list_id, self.user)
            .await
            .map_err(AssignError::Engine)
    }

    async fn create_item(
        &mut self,
        list: &str,
        code: &str,
        label: Option<&str>,
    ) -> Result<ManagedListItemId, ScenarioError> {
        let seeded = self
            .lists
            .get_mut(list)
            .ok_or_else(|| ScenarioError::UnknownList(list.to_string()))?;
        if seeded.items.contains_key(code) {
            return Err(ScenarioError::Duplicate {
                kind: "item",
                name: code.to_string(),
            });
        }
        let item = ManagedListItem::new(
            seeded.list.id,
            code,
            label.unwrap_or(code),
            seeded.next_sort_order,
        );
        seeded.next_sort_order += 1;

        let mut tx = self.store.begin().await?;
        tx.put_managed_list_item(item.clone())?;
        self.store.commit(tx).await?;

        let id = item.id;
        seeded.items.insert(code.to_string(), item);
        Ok(id)
    }

    async fn set_item_active(
        &self,
        list: &str,
        code: &str,
        active: bool,
    ) -> Result<ManagedListItemId, ScenarioError> {
        let id = item_id(self.list(list)?, code)?;
        let mut tx = self.store.begin().await?;
        if let Some(mut item) = tx.managed_list_item(id) {
            item.is_active = active;
            tx.put_managed_list_item(item)?;
        }
        self.store.commit(tx).await?;
        Ok(id)
    }

    async fn subset_id(
        &self,
        list: &str,
        name: &str,
    ) -> Result<subset_model::SubsetDefinitionId, ScenarioError> {
        let list_id = self.list(list)?.list.id;
        let tx = self.store.begin().await?;
        tx.subsets_for_scope(self.project.id, list_id)
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| s.id)
            .ok_or_else(|| ScenarioError::UnknownSubset {
                list: list.to_string(),
                name: name.to_string(),
            })
    }
}

enum AssignError {
    Scenario(ScenarioError),
    Engine(EngineError),
}

impl From<ScenarioError> for AssignError {
    fn from(err: ScenarioError) -> Self {
        Self::Scenario(err)
    }
}

fn item_id(seeded: &SeededList, code: &str) -> Result<ManagedListItemId, ScenarioError> {
    seeded
        .items
        .get(code)
        .map(|i| i.id)
        .ok_or_else(|| ScenarioError::UnknownItem {
            list: seeded.list.name.clone(),
            code: code.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_steps_and_item_forms() {
        let yaml = r"
project:
  name: Tracker
questions: [Q1]
lists:
  - name: Countries
    items:
      - US
      - code: UK
        label: United Kingdom
steps:
  - action: save
    question: Q1
    list: Countries
    items: [US]
  - action: set_status
    status: active
";
        let scenario = Scenario::from_yaml_str(yaml).unwrap();
        assert_eq!(scenario.project.status, ProjectStatus::Draft);
        assert_eq!(scenario.lists[0].items[1].label(), "United Kingdom");
        assert_eq!(
            scenario.steps[1],
            Step::SetStatus {
                status: ProjectStatus::Active
            }
        );
    }

    #[test]
    fn unknown_action_is_a_parse_error() {
        let yaml = "project: {name: T}\nsteps:\n  - action: explode\n";
        assert!(matches!(
            Scenario::from_yaml_str(yaml),
            Err(ScenarioError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn unknown_item_stops_replay() {
        let yaml = r"
project: {name: T}
questions: [Q1]
lists:
  - name: Markets
    items: [X, Y]
steps:
  - action: save
    question: Q1
    list: Markets
    items: [Z]
";
        let scenario = Scenario::from_yaml_str(yaml).unwrap();
        let err = run(&scenario, EngineConfig::default()).await.unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownItem { ref code, .. } if code == "Z"));
    }

    #[tokio::test]
    async fn report_carries_events_and_project_name() {
        let yaml = r"
project: {name: Tracker}
questions: [Q1]
lists:
  - name: Markets
    items: [X, Y]
steps:
  - action: save
    question: Q1
    list: Markets
    items: [X]
";
        let scenario = Scenario::from_yaml_str(yaml).unwrap();
        let report = run(&scenario, EngineConfig::default()).await.unwrap();

        assert_eq!(report.project, "Tracker");
        let kinds: Vec<&str> = report.events.iter().map(SubsetEvent::kind).collect();
        assert_eq!(kinds, vec!["subset_created", "selection_saved"]);
    }
}
