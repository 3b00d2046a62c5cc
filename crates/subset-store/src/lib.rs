//! Subset Store
//!
//! Repository contract for the managed list subset tables plus an in-memory
//! implementation.
//!
//! # Overview
//!
//! - [`SubsetStore`]: opens a unit of work and commits it atomically
//! - [`UnitOfWork`]: typed lookups and staged writes over a consistent snapshot
//! - [`InMemoryStore`]: snapshot + staged-mutation store enforcing the
//!   uniqueness constraints at commit
//!
//! # Example
//!
//! ```rust
//! use subset_model::{Project, ProjectStatus};
//! use subset_store::{InMemoryStore, SubsetStore, UnitOfWork};
//!
//! # async fn example() -> Result<(), subset_store::StoreError> {
//! let store = InMemoryStore::new();
//! let mut tx = store.begin().await?;
//! tx.put_project(Project::new("Brand Tracker", ProjectStatus::Draft))?;
//! store.commit(tx).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod contract;
pub mod error;
pub mod memory;

// Re-exports
pub use contract::{CommitReceipt, SubsetStore, UnitOfWork};
pub use error::{Constraint, StoreError};
pub use memory::{InMemoryStore, MemoryUnitOfWork, Mutation, Tables};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
