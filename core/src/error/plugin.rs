use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Error classification shared by the registry and the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "CONFIG_ERROR")]
    Config,
    #[serde(rename = "EXECUTION_ERROR")]
    Execution,
    #[serde(rename = "DEPENDENCY_ERROR")]
    Dependency,
    #[serde(rename = "INITIALIZATION_ERROR")]
    Initialization,
    #[serde(rename = "VALIDATION_ERROR")]
    Validation,
    #[serde(rename = "NETWORK_ERROR")]
    Network,
    #[serde(rename = "TIMEOUT_ERROR")]
    Timeout,
    #[serde(rename = "AUTHENTICATION_ERROR")]
    Authentication,
    #[serde(rename = "PERMISSION_ERROR")]
    Permission,
    #[serde(rename = "RESOURCE_ERROR")]
    Resource,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "CONFIG_ERROR",
            Self::Execution => "EXECUTION_ERROR",
            Self::Dependency => "DEPENDENCY_ERROR",
            Self::Initialization => "INITIALIZATION_ERROR",
            Self::Validation => "VALIDATION_ERROR",
            Self::Network => "NETWORK_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Authentication => "AUTHENTICATION_ERROR",
            Self::Permission => "PERMISSION_ERROR",
            Self::Resource => "RESOURCE_ERROR",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialisable, immutable snapshot of a [`PluginError`].
///
/// This is what ends up in step records and in `ExecutionResult::error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub plugin_name: String,
    #[serde(default)]
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.plugin_name, self.message)
    }
}

/// Error raised by plugins and by the registry while resolving/running them.
#[derive(Error, Debug, Clone)]
#[error("{kind} in plugin '{plugin_name}': {message}")]
pub struct PluginError {
    pub kind: ErrorKind,
    pub message: String,
    pub plugin_name: String,
    pub context: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl PluginError {
    pub fn new(kind: ErrorKind, plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            plugin_name: plugin_name.into(),
            context: Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn config(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, plugin_name, message)
    }

    pub fn execution(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, plugin_name, message)
    }

    pub fn dependency(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Dependency, plugin_name, message)
    }

    pub fn validation(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, plugin_name, message)
    }

    pub fn network(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, plugin_name, message)
    }

    pub fn timeout(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, plugin_name, message)
    }

    pub fn authentication(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, plugin_name, message)
    }

    pub fn resource(plugin_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, plugin_name, message)
    }

    /// Attach a context entry. Later entries with the same key win.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Re-attribute an error raised by a collaborator (e.g. a session) to a plugin.
    pub fn for_plugin(mut self, plugin_name: &str) -> Self {
        if self.plugin_name.is_empty() {
            self.plugin_name = plugin_name.to_string();
        }
        self
    }

    pub fn to_record(&self) -> ErrorRecord {
        ErrorRecord {
            kind: self.kind,
            message: self.message.clone(),
            plugin_name: self.plugin_name.clone(),
            context: self.context.clone(),
            timestamp: self.timestamp,
        }
    }
}

impl From<ErrorRecord> for PluginError {
    fn from(record: ErrorRecord) -> Self {
        Self {
            kind: record.kind,
            message: record.message,
            plugin_name: record.plugin_name,
            context: record.context,
            timestamp: record.timestamp,
        }
    }
}
