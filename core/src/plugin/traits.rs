use async_trait::async_trait;

use crate::account::Account;
use crate::error::PluginError;
use crate::plugin::types::{PluginConfig, PluginDependency, PluginMetadata, PluginOutput};
use crate::session::Session;

/// A named unit of work that acts on a session for an account.
///
/// Implementations are registered by name in a [`PluginRegistry`](crate::plugin::PluginRegistry).
/// Configuration is passed explicitly into `run`; the registry owns the effective config.
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    fn metadata(&self) -> PluginMetadata;

    /// Plugins that run before this one, left to right.
    fn requires(&self) -> Vec<PluginDependency> {
        Vec::new()
    }

    fn default_config(&self) -> PluginConfig {
        PluginConfig::new()
    }

    /// Reject a config before it is stored. Errors should be `ErrorKind::Config`.
    fn validate_config(&self, _config: &PluginConfig) -> Result<(), PluginError> {
        Ok(())
    }

    async fn run(
        &self,
        session: &mut dyn Session,
        account: &Account,
        config: &PluginConfig,
    ) -> Result<PluginOutput, PluginError>;

    async fn health(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
