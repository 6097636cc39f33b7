use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorRecord;

/// Plugin configuration; a JSON object.
pub type PluginConfig = Map<String, Value>;

/// Result fields returned by a plugin body.
pub type PluginOutput = Map<String, Value>;

/// A plugin another plugin requires (or optionally benefits from) having run first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginDependency {
    pub name: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
}

impl PluginDependency {
    /// Dependency whose failure aborts the dependent.
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: false,
            version_constraint: None,
        }
    }

    /// Dependency whose failure is logged and ignored.
    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            optional: true,
            version_constraint: None,
        }
    }

    /// Recorded for display; not enforced.
    pub fn with_version(mut self, constraint: impl Into<String>) -> Self {
        self.version_constraint = Some(constraint.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "unknown",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub version: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(default)]
    pub health_status: HealthStatus,
}

impl PluginMetadata {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            version: version.into(),
            categories: Vec::new(),
            tags: Vec::new(),
            author: None,
            homepage: None,
            license: None,
            health_status: HealthStatus::Unknown,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Case-insensitive substring match on name, description and tags.
    pub fn matches_query(&self, query: &str) -> bool {
        let q = query.to_lowercase();
        self.name.to_lowercase().contains(&q)
            || self.description.to_lowercase().contains(&q)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&q))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub name: String,
    pub status: HealthStatus,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

/// Terminal outcome of one plugin invocation, retries included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Fields produced by the plugin body.
    #[serde(default)]
    pub output: PluginOutput,
    /// Results of the dependencies that ran first, keyed by plugin name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, ExecutionResult>,
    pub execution_time_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
}

impl ExecutionResult {
    /// `message` is lifted from the output's `message` field when present.
    pub fn succeeded(
        output: PluginOutput,
        dependencies: BTreeMap<String, ExecutionResult>,
        execution_time_seconds: f64,
    ) -> Self {
        let message = output
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self {
            success: true,
            message,
            output,
            dependencies,
            execution_time_seconds,
            error: None,
        }
    }

    pub fn failed(
        error: ErrorRecord,
        dependencies: BTreeMap<String, ExecutionResult>,
        execution_time_seconds: f64,
    ) -> Self {
        Self {
            success: false,
            message: Some(error.message.clone()),
            output: PluginOutput::new(),
            dependencies,
            execution_time_seconds,
            error: Some(error),
        }
    }

    /// Look up a result field: plugin output first, then the fixed fields.
    pub fn field(&self, name: &str) -> Option<Value> {
        if let Some(v) = self.output.get(name) {
            return Some(v.clone());
        }
        match name {
            "success" => Some(Value::Bool(self.success)),
            "message" => self.message.clone().map(Value::String),
            "execution_time_seconds" => Some(Value::from(self.execution_time_seconds)),
            _ => None,
        }
    }

    /// Every dependency result in the tree, deepest first, as `(plugin, result)`.
    pub fn flatten_dependencies(&self) -> Vec<(&str, &ExecutionResult)> {
        let mut out = Vec::new();
        for (name, result) in &self.dependencies {
            out.extend(result.flatten_dependencies());
            out.push((name.as_str(), result));
        }
        out
    }
}
