//! Testing utilities for the managed list subsets workspace
//!
//! Shared fixtures, recording collaborators and a store that can inject a
//! competing commit.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use subset_engine::{
    AssociationOutcome, AutoAssociationService, EngineConfig, EngineContext, EngineError,
    EventSink, QuestionSelection, RefreshHooks, SaveSelectionRequest, SaveSelectionResult,
    SubsetEvent, SubsetManagementService,
};
use subset_model::{
    ManagedList, ManagedListItem, ManagedListItemId, Project, ProjectId, ProjectStatus,
    QuestionManagedList, QuestionnaireLine, SubsetDefinitionId, UserId,
};
use subset_store::{
    CommitReceipt, InMemoryStore, MemoryUnitOfWork, StoreError, SubsetStore, Tables, UnitOfWork,
};

/// Event sink that keeps every event
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<SubsetEvent>>,
}

impl RecordingEventSink {
    pub fn events(&self) -> Vec<SubsetEvent> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(SubsetEvent::kind).collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event: &SubsetEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Refresh hooks that record what they were asked to refresh
#[derive(Debug, Default)]
pub struct RecordingRefreshHooks {
    projects: Mutex<Vec<ProjectId>>,
    displays: Mutex<Vec<SubsetDefinitionId>>,
}

impl RecordingRefreshHooks {
    pub fn project_refreshes(&self) -> Vec<ProjectId> {
        self.projects.lock().clone()
    }

    pub fn display_refreshes(&self) -> Vec<SubsetDefinitionId> {
        self.displays.lock().clone()
    }

    pub fn clear(&self) {
        self.projects.lock().clear();
        self.displays.lock().clear();
    }
}

#[async_trait]
impl RefreshHooks for RecordingRefreshHooks {
    async fn refresh_project_summary(&self, project_id: ProjectId) {
        self.projects.lock().push(project_id);
    }

    async fn refresh_question_displays(&self, subset_definition_id: SubsetDefinitionId) {
        self.displays.lock().push(subset_definition_id);
    }
}

type Interloper = Box<dyn FnOnce(&mut MemoryUnitOfWork) + Send>;

/// [`InMemoryStore`] wrapper that can commit a competing unit of work just
/// before the next commit, simulating a concurrent writer
#[derive(Default)]
pub struct RacingStore {
    inner: InMemoryStore,
    interloper: Mutex<Option<Interloper>>,
    commits: Mutex<u32>,
}

impl std::fmt::Debug for RacingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RacingStore")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl RacingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `write` in its own unit of work and commit it right before the next commit
    pub fn interleave_before_next_commit(
        &self,
        write: impl FnOnce(&mut MemoryUnitOfWork) + Send + 'static,
    ) {
        *self.interloper.lock() = Some(Box::new(write));
    }

    pub fn snapshot(&self) -> Tables {
        self.inner.snapshot()
    }

    pub fn version(&self) -> u64 {
        self.inner.version()
    }

    /// Commits attempted through this wrapper, interlopers excluded
    pub fn commit_attempts(&self) -> u32 {
        *self.commits.lock()
    }
}

#[async_trait]
impl SubsetStore for RacingStore {
    type Tx = MemoryUnitOfWork;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        self.inner.begin().await
    }

    async fn commit(&self, tx: Self::Tx) -> Result<CommitReceipt, StoreError> {
        *self.commits.lock() += 1;
        let interloper = self.interloper.lock().take();
        if let Some(write) = interloper {
            let mut competing = self.inner.begin().await?;
            write(&mut competing);
            self.inner.commit(competing).await?;
        }
        self.inner.commit(tx).await
    }
}

/// Store, recording collaborators and both services wired together
#[derive(Debug)]
pub struct Fixture {
    pub store: Arc<RacingStore>,
    pub events: Arc<RecordingEventSink>,
    pub hooks: Arc<RecordingRefreshHooks>,
    pub management: SubsetManagementService<RacingStore>,
    pub association: AutoAssociationService<RacingStore>,
    pub user: UserId,
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let store = Arc::new(RacingStore::new());
        let events = Arc::new(RecordingEventSink::default());
        let hooks = Arc::new(RecordingRefreshHooks::default());
        let ctx = EngineContext::new(Arc::clone(&store))
            .with_config(config)
            .with_event_sink(events.clone())
            .with_refresh_hooks(hooks.clone());

        Self {
            management: SubsetManagementService::new(ctx.clone()),
            association: AutoAssociationService::new(ctx),
            store,
            events,
            hooks,
            user: UserId::new(),
        }
    }

    async fn write(&self, f: impl FnOnce(&mut MemoryUnitOfWork) -> Result<(), StoreError>) {
        let mut tx = self.store.begin().await.expect("begin");
        f(&mut tx).expect("seed write");
        self.store.inner.commit(tx).await.expect("seed commit");
    }

    pub async fn seed_project(&self, name: &str, status: ProjectStatus) -> Project {
        let project = Project::new(name, status);
        let row = project.clone();
        self.write(|tx| tx.put_project(row)).await;
        project
    }

    pub async fn set_project_status(&self, project_id: ProjectId, status: ProjectStatus) {
        let mut project = self.store.snapshot().project(project_id).expect("project");
        project.status = status;
        self.write(|tx| tx.put_project(project)).await;
    }

    pub async fn seed_line(&self, project: &Project, name: &str) -> QuestionnaireLine {
        let line = QuestionnaireLine::new(project.id, name);
        let row = line.clone();
        self.write(|tx| tx.put_questionnaire_line(row)).await;
        line
    }

    /// List with one active item per code, sort order following `codes`
    pub async fn seed_list(
        &self,
        project: &Project,
        name: &str,
        codes: &[&str],
    ) -> (ManagedList, Vec<ManagedListItem>) {
        let list = ManagedList::new(project.id, name);
        let items: Vec<ManagedListItem> = codes
            .iter()
            .zip(1..)
            .map(|(code, order)| ManagedListItem::new(list.id, *code, *code, order))
            .collect();
        let (list_row, item_rows) = (list.clone(), items.clone());
        self.write(|tx| {
            tx.put_managed_list(list_row)?;
            item_rows
                .into_iter()
                .try_for_each(|item| tx.put_managed_list_item(item))
        })
        .await;
        (list, items)
    }

    /// Add an item without notifying the engine
    pub async fn seed_item(&self, list: &ManagedList, code: &str, sort_order: i32) -> ManagedListItem {
        let item = ManagedListItem::new(list.id, code, code, sort_order);
        let row = item.clone();
        self.write(|tx| tx.put_managed_list_item(row)).await;
        item
    }

    /// Record the assignment row without notifying the engine
    pub async fn seed_assignment(&self, line: &QuestionnaireLine, list: &ManagedList) {
        let (line_id, list_id, user) = (line.id, list.id, self.user);
        self.write(|tx| {
            if tx.assignment(line_id, list_id).is_some() {
                return Ok(());
            }
            tx.insert_assignment(QuestionManagedList::new(line_id, list_id, user, Utc::now()))
        })
        .await;
    }

    /// Record the assignment row, then notify the engine
    pub async fn assign(
        &self,
        line: &QuestionnaireLine,
        list: &ManagedList,
    ) -> Result<AssociationOutcome, EngineError> {
        self.seed_assignment(line, list).await;
        self.association
            .on_managed_list_assigned_to_question(line.id, list.id, self.user)
            .await
    }

    /// Add an item, then notify the engine
    pub async fn create_item(
        &self,
        list: &ManagedList,
        code: &str,
        sort_order: i32,
    ) -> (ManagedListItem, Result<AssociationOutcome, EngineError>) {
        let item = self.seed_item(list, code, sort_order).await;
        let outcome = self
            .association
            .on_managed_list_item_created(item.id, self.user)
            .await;
        (item, outcome)
    }

    /// Flip the item's active flag, then notify the engine
    pub async fn deactivate_item(
        &self,
        item_id: ManagedListItemId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.set_item_active(item_id, false).await;
        self.association
            .on_managed_list_item_deactivated(item_id, self.user)
            .await
    }

    /// Flip the item's active flag back, then notify the engine
    pub async fn reactivate_item(
        &self,
        item_id: ManagedListItemId,
    ) -> Result<AssociationOutcome, EngineError> {
        self.set_item_active(item_id, true).await;
        self.association
            .on_managed_list_item_reactivated(item_id, self.user)
            .await
    }

    async fn set_item_active(&self, item_id: ManagedListItemId, active: bool) {
        let mut item = self
            .store
            .snapshot()
            .managed_list_item(item_id)
            .expect("item");
        item.is_active = active;
        self.write(|tx| tx.put_managed_list_item(item)).await;
    }

    pub async fn save(
        &self,
        project: &Project,
        line: &QuestionnaireLine,
        list: &ManagedList,
        items: &[&ManagedListItem],
    ) -> Result<SaveSelectionResult, EngineError> {
        self.management
            .save_question_selection(SaveSelectionRequest::new(
                project.id,
                line.id,
                list.id,
                items.iter().map(|i| i.id),
                self.user,
            ))
            .await
    }

    pub async fn selection(&self, line: &QuestionnaireLine, list: &ManagedList) -> QuestionSelection {
        self.management
            .get_question_selection(line.id, list.id)
            .await
            .expect("question selection")
    }

    /// Codes a question currently shows for a list
    pub async fn selection_codes(&self, line: &QuestionnaireLine, list: &ManagedList) -> Vec<String> {
        self.selection(line, list)
            .await
            .codes()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
