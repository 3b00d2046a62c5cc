//! subsetctl
//!
//! Replays managed list scenarios (seed a project, save selections, fire
//! list lifecycle callbacks) against the in-memory store and reports the
//! resulting subsets.

#![allow(missing_docs)]

pub mod report;
pub mod scenario;

pub use report::{ScenarioReport, StepOutcome, StepReport};
pub use scenario::{run, Scenario, ScenarioError, Step};
