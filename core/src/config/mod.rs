pub mod load;
pub mod types;

pub use load::{get_famp_home, load_default, load_from};
pub use types::{AppConfig, LoggingConfig, PluginsConfig, WorkflowConfig};
