//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `famp_core::api` instead of reaching into internal modules.

pub use crate::account::{Account, Secret};
pub use crate::config::{load_default, AppConfig, LoggingConfig, PluginsConfig, WorkflowConfig};
pub use crate::context::{AppContext, PluginLoader};
pub use crate::error::{CliError, ErrorKind, ErrorRecord, PluginError, WorkflowError};
pub use crate::plugin::{
    ExecutionResult, HealthReport, HealthStatus, Plugin, PluginConfig, PluginDependency,
    PluginMetadata, PluginOutput, PluginRegistry,
};
pub use crate::retry::RetryPolicy;
pub use crate::session::{Cookie, ElementHandle, Selector, Session, SessionError};
pub use crate::workflow::{
    ConditionOperator, JsonFileStore, RunOptions, StepCondition, StepStatus, Workflow,
    WorkflowManager, WorkflowStatus, WorkflowStep, WorkflowStore, WorkflowSummary,
};
