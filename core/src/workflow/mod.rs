//! Resumable, persisted workflows.
//!
//! A [`Workflow`] is an ordered list of plugin steps. Steps run strictly in order,
//! each optionally gated by a [`StepCondition`] on earlier results. The workflow is
//! saved after every step so a failed or interrupted run resumes at the step it
//! stopped on.

pub mod condition;
pub mod engine;
pub mod manager;
pub mod store;
pub mod types;

pub use condition::{ConditionOperator, StepCondition};
pub use engine::RunOptions;
pub use manager::WorkflowManager;
pub use store::{validate_workflow_name, JsonFileStore, WorkflowStore};
pub use types::{StepStatus, Workflow, WorkflowStatus, WorkflowStep, WorkflowSummary};
