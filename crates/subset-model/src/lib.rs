//! Managed List Subset Model
//!
//! Typed entities for project-scoped managed lists and the subsets that
//! questions select from them.
//!
//! # Core Concepts
//!
//! - [`ManagedList`] / [`ManagedListItem`]: shared reference list and its entries
//! - [`QuestionManagedList`]: a list wired to a questionnaire line
//! - [`QuestionSubsetLink`]: which subset (if any) a question uses for a list;
//!   `None` means the full active set
//! - [`SubsetDefinition`] / [`SubsetMembership`]: a materialized, named subset
//! - [`SubsetSignature`]: content hash over a set of item ids, the identity of a subset
//!
//! # Example
//!
//! ```rust
//! use subset_model::{ManagedListItemId, SubsetSignature};
//!
//! let a = ManagedListItemId::new();
//! let b = ManagedListItemId::new();
//!
//! let forward = SubsetSignature::build([a, b]).unwrap();
//! let reversed = SubsetSignature::build([b, a, b]).unwrap();
//! assert_eq!(forward, reversed);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod entities;
mod ids;
mod naming;
mod signature;

pub use entities::{
    ManagedList, ManagedListItem, ManagedListStatus, Project, ProjectStatus, QuestionManagedList,
    QuestionSubsetLink, QuestionnaireLine, SubsetDefinition, SubsetMembership, SubsetStatus,
};
pub use ids::{
    ManagedListId, ManagedListItemId, ProjectId, QuestionManagedListId, QuestionSubsetLinkId,
    QuestionnaireLineId, SubsetDefinitionId, SubsetMembershipId, UserId,
};
pub use naming::{next_subset_name, parse_subset_suffix, NextName, DEFAULT_NAME_SEPARATOR};
pub use signature::{SignatureError, SubsetSignature};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
