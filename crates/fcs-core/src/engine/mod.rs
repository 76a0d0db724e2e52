//! Test execution engine.

pub mod events;
mod execute;
mod runner;
mod schema;

pub use events::{CaseFailure, FailureKind, RunEvent, TestCaseResult};
pub use runner::{RunOutcome, RunPolicy, RunSummary, Runner};
