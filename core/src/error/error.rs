use thiserror::Error;

use super::plugin::{ErrorRecord, PluginError};

#[derive(Error, Debug)]
pub enum CliError {
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("workflow '{0}' not found")]
    NotFound(String),

    #[error("workflow '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid workflow name '{0}'")]
    InvalidName(String),

    #[error("cannot resume from step {index}: workflow has {len} steps")]
    InvalidResume { index: usize, len: usize },

    #[error("step {index} ({plugin}) failed: {error}; resumable from step {index}")]
    StepFailed {
        index: usize,
        plugin: String,
        error: ErrorRecord,
    },

    #[error("workflow paused before step {step}")]
    Cancelled { step: usize },

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Step index a caller can resume from, when the error leaves the workflow resumable.
    pub fn resume_point(&self) -> Option<usize> {
        match self {
            Self::StepFailed { index, .. } => Some(*index),
            Self::Cancelled { step } => Some(*step),
            _ => None,
        }
    }
}
