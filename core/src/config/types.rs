use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::plugin::PluginConfig;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root for workflow state and logs. Empty means `$FAMP_HOME` (default `~/.famp`).
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Policy for standalone plugin runs, and for workflow steps when
    /// `workflow.retry_steps` is set.
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl AppConfig {
    pub fn workflows_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("workflows"))
    }

    /// Retry policy to thread into workflow steps, if any.
    pub fn step_retry(&self) -> Option<RetryPolicy> {
        self.workflow.retry_steps.then(|| self.retry.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory`.
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "famp_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Apply `[retry]` to every workflow step. Off by default: steps run once.
    #[serde(default)]
    pub retry_steps: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Built-in plugins that are not registered.
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Per-plugin config tables, applied once at load time.
    #[serde(default)]
    pub settings: BTreeMap<String, PluginConfig>,
}

impl PluginsConfig {
    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.iter().any(|d| d == name)
    }
}
