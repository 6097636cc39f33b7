use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorRecord;
use crate::plugin::{ExecutionResult, PluginConfig};
use crate::workflow::condition::StepCondition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Paused,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Paused => "paused",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub plugin_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<PluginConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<StepCondition>,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default)]
    pub result: Option<ExecutionResult>,
    #[serde(default)]
    pub error: Option<ErrorRecord>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl WorkflowStep {
    pub fn new(
        plugin_name: impl Into<String>,
        config: Option<PluginConfig>,
        condition: Option<StepCondition>,
    ) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            config,
            condition,
            status: StepStatus::Pending,
            result: None,
            error: None,
            start_time: None,
            end_time: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.result = None;
        self.error = None;
        self.start_time = None;
        self.end_time = None;
    }
}

/// An ordered, persisted sequence of plugin invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub status: WorkflowStatus,
    /// Next step to attempt.
    #[serde(default)]
    pub current_step: usize,
    /// Last result per plugin name.
    #[serde(default)]
    pub results: BTreeMap<String, ExecutionResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Empty `Pending` workflow with the cursor at step 0.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
            status: WorkflowStatus::Pending,
            current_step: 0,
            results: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a pending step; returns its index.
    pub fn add_step(
        &mut self,
        plugin_name: impl Into<String>,
        config: Option<PluginConfig>,
        condition: Option<StepCondition>,
    ) -> usize {
        self.steps.push(WorkflowStep::new(plugin_name, config, condition));
        self.touch();
        self.steps.len() - 1
    }

    /// Listing view without steps or results.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            name: self.name.clone(),
            description: self.description.clone(),
            status: self.status,
            current_step: self.current_step,
            step_count: self.steps.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Back to step 0 with every step pending and no accumulated results.
    pub(crate) fn reset(&mut self) {
        for step in &mut self.steps {
            step.reset();
        }
        self.results.clear();
        self.current_step = 0;
        self.status = WorkflowStatus::Pending;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub name: String,
    pub description: String,
    pub status: WorkflowStatus,
    pub current_step: usize,
    pub step_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
