pub mod graph;
pub mod registry;
pub mod traits;
pub mod types;

pub use graph::DependencyGraph;
pub use registry::PluginRegistry;
pub use traits::Plugin;
pub use types::{
    ExecutionResult, HealthReport, HealthStatus, PluginConfig, PluginDependency, PluginMetadata,
    PluginOutput,
};
