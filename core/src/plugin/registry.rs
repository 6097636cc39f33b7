use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{ErrorKind, PluginError};
use crate::plugin::graph::DependencyGraph;
use crate::plugin::traits::Plugin;
use crate::plugin::types::{
    ExecutionResult, HealthReport, HealthStatus, PluginConfig, PluginMetadata, PluginOutput,
};
use crate::retry::RetryPolicy;
use crate::session::Session;

struct PluginEntry {
    plugin: Arc<dyn Plugin>,
    config: PluginConfig,
    metadata: PluginMetadata,
}

/// Registered plugins, their effective configs and the required-dependency graph.
#[derive(Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginEntry>,
    graph: DependencyGraph,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `plugin` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: &str, plugin: Arc<dyn Plugin>) {
        let required = plugin
            .requires()
            .into_iter()
            .filter(|d| !d.optional)
            .map(|d| d.name)
            .collect();
        let mut metadata = plugin.metadata();
        metadata.name = name.to_string();
        let config = plugin.default_config();

        if self.entries.contains_key(name) {
            info!(plugin = name, "reloading plugin");
        } else {
            info!(plugin = name, version = %metadata.version, "registered plugin");
        }

        self.graph.insert(name, required);
        self.entries.insert(
            name.to_string(),
            PluginEntry {
                plugin,
                config,
                metadata,
            },
        );
    }

    /// Remove a plugin with its config and metadata. `false` if it was not registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.graph.remove(name);
        self.entries.remove(name).is_some()
    }

    /// Drop every plugin.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.graph.clear();
    }

    /// Registered plugin by name; no side effects.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.entries.get(name).map(|e| Arc::clone(&e.plugin))
    }

    /// Whether `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Effective config of a registered plugin.
    pub fn config(&self, name: &str) -> Option<&PluginConfig> {
        self.entries.get(name).map(|e| &e.config)
    }

    /// Stored metadata, including the last health status.
    pub fn metadata(&self, name: &str) -> Option<&PluginMetadata> {
        self.entries.get(name).map(|e| &e.metadata)
    }

    /// Summaries of every registered plugin, sorted by name.
    pub fn list_all(&self) -> Vec<PluginMetadata> {
        let mut all: Vec<PluginMetadata> = self.entries.values().map(|e| e.metadata.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Filter by free-text `query`, then keep plugins matching any of `categories`
    /// and any of `tags`. Empty filters match everything.
    pub fn search(&self, query: Option<&str>, categories: &[String], tags: &[String]) -> Vec<PluginMetadata> {
        self.list_all()
            .into_iter()
            .filter(|m| query.map(|q| m.matches_query(q)).unwrap_or(true))
            .filter(|m| categories.is_empty() || m.categories.iter().any(|c| categories.contains(c)))
            .filter(|m| tags.is_empty() || m.tags.iter().any(|t| tags.contains(t)))
            .collect()
    }

    /// `DependencyError` if `name` or any of its required dependencies is not registered.
    pub fn validate_dependencies(&self, name: &str) -> Result<(), PluginError> {
        self.graph.validate_dependencies(name)
    }

    /// `DependencyError` carrying the loop, in order, if a cycle is reachable from `name`.
    /// Diamonds are not cycles.
    pub fn detect_cycles(&self, name: &str) -> Result<(), PluginError> {
        self.graph.detect_cycles(name)
    }

    /// Order in which `run(name)` would execute plugin bodies, `name` last.
    pub fn resolution_order(&self, name: &str) -> Result<Vec<String>, PluginError> {
        self.graph.resolution_order(name)
    }

    /// Replace a plugin's config with its defaults overlaid by `config`.
    pub fn configure(&mut self, name: &str, config: PluginConfig) -> Result<(), PluginError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| PluginError::dependency(name, format!("plugin '{name}' is not registered")))?;

        let mut effective = entry.plugin.default_config();
        effective.extend(config);

        entry.plugin.validate_config(&effective).map_err(|e| {
            let mut err = PluginError::new(ErrorKind::Config, name, e.message);
            err.context = e.context;
            err.with_context("config", Value::Object(effective.clone()))
        })?;

        debug!(plugin = name, "plugin configured");
        entry.config = effective;
        Ok(())
    }

    /// Run the plugin's health hook and store the resulting status in its metadata.
    pub async fn check_health(&mut self, name: &str) -> Result<HealthReport, PluginError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| PluginError::dependency(name, format!("plugin '{name}' is not registered")))?;
        let plugin = Arc::clone(&entry.plugin);
        let version = entry.metadata.version.clone();

        let (status, error) = match plugin.health().await {
            Ok(()) => (HealthStatus::Healthy, None),
            Err(e) => {
                warn!(plugin = name, error = %e, "health check failed");
                (HealthStatus::Unhealthy, Some(e.for_plugin(name).to_record()))
            }
        };

        if let Some(entry) = self.entries.get_mut(name) {
            entry.metadata.health_status = status;
        }

        Ok(HealthReport {
            name: name.to_string(),
            status,
            version,
            timestamp: Utc::now(),
            error,
        })
    }

    /// Run `name` after its dependencies.
    ///
    /// `Err` is returned only when the dependency graph reachable from `name` is broken
    /// (unknown plugin, missing required dependency, cycle); nothing has run in that case.
    /// Every other failure comes back as a result with `success == false`.
    #[tracing::instrument(name = "plugin.run", skip_all, fields(plugin = %name))]
    pub async fn run(
        &mut self,
        name: &str,
        session: &mut dyn Session,
        account: &Account,
        config: Option<PluginConfig>,
        retry: Option<&RetryPolicy>,
    ) -> Result<ExecutionResult, PluginError> {
        self.graph.preflight(name)?;

        let started = Instant::now();
        match self.run_inner(name.to_string(), session, account, config, retry).await {
            Ok(result) => Ok(result),
            Err(err) => {
                warn!(plugin = name, kind = %err.kind, error = %err.message, "plugin failed");
                Ok(ExecutionResult::failed(
                    err.for_plugin(name).to_record(),
                    BTreeMap::new(),
                    started.elapsed().as_secs_f64(),
                ))
            }
        }
    }

    fn run_inner<'a>(
        &'a mut self,
        name: String,
        session: &'a mut dyn Session,
        account: &'a Account,
        config: Option<PluginConfig>,
        retry: Option<&'a RetryPolicy>,
    ) -> BoxFuture<'a, Result<ExecutionResult, PluginError>> {
        Box::pin(async move {
            let plugin = self
                .get(&name)
                .ok_or_else(|| PluginError::dependency(&name, format!("plugin '{name}' is not registered")))?;

            if let Some(config) = config {
                self.configure(&name, config)?;
            }

            let mut dependencies = BTreeMap::new();
            for dep in plugin.requires() {
                if !self.contains(&dep.name) {
                    if dep.optional {
                        debug!(plugin = %name, dependency = %dep.name, "optional dependency not registered");
                        continue;
                    }
                    return Err(PluginError::dependency(
                        &name,
                        format!("required dependency '{}' of '{name}' is not registered", dep.name),
                    ));
                }

                match self
                    .run_inner(dep.name.clone(), &mut *session, account, None, retry)
                    .await
                {
                    Ok(result) => {
                        dependencies.insert(dep.name.clone(), result);
                    }
                    Err(err) if dep.optional => {
                        warn!(
                            plugin = %name,
                            dependency = %dep.name,
                            error = %err,
                            "optional dependency failed, continuing"
                        );
                    }
                    Err(err) => return Err(err.with_context("required_by", name.as_str())),
                }
            }

            let config = self.config(&name).cloned().unwrap_or_default();

            info!(plugin = %name, "running plugin");
            let started = Instant::now();
            let output = run_with_retry(plugin.as_ref(), &name, session, account, &config, retry).await?;
            let elapsed = started.elapsed().as_secs_f64();
            info!(plugin = %name, elapsed_secs = elapsed, "plugin completed");

            Ok(ExecutionResult::succeeded(output, dependencies, elapsed))
        })
    }
}

/// Invoke the plugin body, retrying retryable failures with backoff when a policy is given.
async fn run_with_retry(
    plugin: &dyn Plugin,
    name: &str,
    session: &mut dyn Session,
    account: &Account,
    config: &PluginConfig,
    retry: Option<&RetryPolicy>,
) -> Result<PluginOutput, PluginError> {
    let mut attempt: u32 = 1;
    loop {
        let err = match plugin.run(&mut *session, account, config).await {
            Ok(output) => return Ok(output),
            Err(e) => e.for_plugin(name),
        };

        let Some(policy) = retry.filter(|p| p.is_retryable(err.kind)) else {
            return Err(err);
        };

        if attempt >= policy.attempts() {
            return Err(PluginError::execution(
                name,
                format!("plugin '{name}' failed after {} attempts", policy.attempts()),
            )
            .with_context("attempts", policy.attempts())
            .with_context("last_error", serde_json::to_value(err.to_record()).unwrap_or(Value::Null)));
        }

        attempt += 1;
        let delay = policy.delay_for(attempt);
        warn!(
            plugin = name,
            attempt,
            max_attempts = policy.attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying plugin"
        );
        tokio::time::sleep(delay).await;
    }
}
