//! Subset Engine
//!
//! Services that keep question-level selections of managed list items
//! consistent and deduplicated.
//!
//! # Core Concepts
//!
//! - [`SubsetManagementService`]: saves selections, reuses or creates named
//!   subsets by signature, lists and deletes them
//! - [`AutoAssociationService`]: reacts to item and assignment lifecycle
//!   callbacks for draft projects
//! - [`EngineContext`]: store, [`EngineConfig`], [`EventSink`] and
//!   [`RefreshHooks`] shared by both services
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use subset_engine::{EngineContext, SaveSelectionRequest, SubsetManagementService};
//! use subset_model::{ManagedList, ManagedListItem, Project, ProjectStatus, QuestionnaireLine, UserId};
//! use subset_store::{InMemoryStore, SubsetStore, UnitOfWork};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(InMemoryStore::new());
//! let project = Project::new("Brand Tracker", ProjectStatus::Draft);
//! let line = QuestionnaireLine::new(project.id, "Q1");
//! let list = ManagedList::new(project.id, "Markets");
//! let uk = ManagedListItem::new(list.id, "UK", "United Kingdom", 1);
//! let fr = ManagedListItem::new(list.id, "FR", "France", 2);
//!
//! let mut tx = store.begin().await?;
//! tx.put_project(project.clone())?;
//! tx.put_questionnaire_line(line.clone())?;
//! tx.put_managed_list(list.clone())?;
//! tx.put_managed_list_item(uk.clone())?;
//! tx.put_managed_list_item(fr)?;
//! store.commit(tx).await?;
//!
//! let service = SubsetManagementService::new(EngineContext::new(store));
//! let saved = service
//!     .save_question_selection(SaveSelectionRequest::new(
//!         project.id,
//!         line.id,
//!         list.id,
//!         [uk.id],
//!         UserId::new(),
//!     ))
//!     .await?;
//! assert_eq!(saved.subset_name.as_deref(), Some("Markets_SUB1"));
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod association;
mod config;
mod context;
mod error;
mod events;
mod hooks;
mod management;
mod types;

pub use association::AutoAssociationService;
pub use config::{EngineConfig, SignatureOnTrim};
pub use context::EngineContext;
pub use error::{ConfigError, EngineError, Entity};
pub use events::{EventSink, NoopEventSink, SubsetEvent, Trigger, TracingEventSink};
pub use hooks::{NoopRefreshHooks, RefreshHooks};
pub use management::SubsetManagementService;
pub use types::{
    AssociationOutcome, DeleteSubsetResult, ProjectSubsets, QuestionSelection,
    SaveSelectionRequest, SaveSelectionResult, SubsetDetails, SubsetMember, SubsetSummary,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
