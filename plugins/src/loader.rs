//! [`PluginLoader`] that installs the built-in plugins from config.
use famp_core::api::{AppConfig, CliError, PluginLoader, PluginRegistry};
use tracing::{debug, info, warn};

use crate::factory;

#[derive(Debug, Default)]
pub struct BuiltinPluginLoader;

impl PluginLoader for BuiltinPluginLoader {
    fn load(&self, cfg: &AppConfig, registry: &mut PluginRegistry) -> Result<(), CliError> {
        for plugin in factory::build_builtins() {
            let name = plugin.name().to_string();
            if cfg.plugins.is_disabled(&name) {
                debug!(plugin = %name, "plugin disabled by config");
                continue;
            }
            registry.register(&name, plugin);
        }

        for (name, settings) in &cfg.plugins.settings {
            if !registry.contains(name) {
                warn!(plugin = %name, "settings for a plugin that is not loaded");
                continue;
            }
            registry.configure(name, settings.clone())?;
        }

        info!(plugins = registry.len(), "built-in plugins loaded");
        Ok(())
    }
}
