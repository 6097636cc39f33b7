use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::AppConfig;
use crate::error::CliError;
use crate::plugin::PluginRegistry;
use crate::workflow::{JsonFileStore, RunOptions, WorkflowManager};

/// Fills a registry with plugins. The core never discovers plugins on its own.
pub trait PluginLoader: Send + Sync {
    fn load(&self, cfg: &AppConfig, registry: &mut PluginRegistry) -> Result<(), CliError>;
}

/// Process-level state: config, the plugin registry, the workflow manager and the
/// cancellation token every run observes.
pub struct AppContext {
    cfg: AppConfig,
    registry: PluginRegistry,
    workflows: WorkflowManager,
    cancel: CancellationToken,
}

impl AppContext {
    /// Open the workflow store under `cfg.data_dir` and fill the registry through `loader`.
    pub fn new(cfg: AppConfig, loader: Option<Arc<dyn PluginLoader>>) -> Result<Self, CliError> {
        let workflows_dir = cfg
            .workflows_dir()
            .ok_or_else(|| CliError::Config("data_dir is not set".into()))?;
        let store = JsonFileStore::new(workflows_dir)?;
        let workflows = WorkflowManager::open(Arc::new(store))?;

        let mut registry = PluginRegistry::new();
        if let Some(loader) = loader {
            loader.load(&cfg, &mut registry)?;
        }
        info!(plugins = registry.len(), "application context ready");

        Ok(Self {
            cfg,
            registry,
            workflows,
            cancel: CancellationToken::new(),
        })
    }

    pub fn cfg(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut PluginRegistry {
        &mut self.registry
    }

    pub fn workflows(&self) -> &WorkflowManager {
        &self.workflows
    }

    /// Both halves at once, for `WorkflowManager::run`.
    pub fn split_mut(&mut self) -> (&mut WorkflowManager, &mut PluginRegistry) {
        (&mut self.workflows, &mut self.registry)
    }

    /// Clone of the token every run started from this context observes.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Options for a workflow run under this context's config and token.
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            retry: self.cfg.step_retry(),
            cancel: Some(self.cancel.clone()),
        }
    }

    /// Cancel in-flight runs and drop every registered plugin.
    pub fn cleanup(&mut self) {
        self.cancel.cancel();
        self.registry.clear();
        info!("application context cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cleanup_cancels_and_clears() {
        let dir = tempdir().unwrap();
        let cfg = AppConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..AppConfig::default()
        };
        let mut ctx = AppContext::new(cfg, None).unwrap();
        let token = ctx.cancel_token();
        assert!(ctx.run_options().retry.is_none());

        ctx.cleanup();
        assert!(token.is_cancelled());
        assert!(ctx.registry().is_empty());
        assert!(dir.path().join("workflows").is_dir());
    }

    #[test]
    fn test_missing_data_dir_is_config_error() {
        let err = AppContext::new(AppConfig::default(), None).err().unwrap();
        assert!(matches!(err, CliError::Config(_)));
    }
}
