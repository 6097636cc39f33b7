#[allow(clippy::module_inception)]
pub mod error;
pub mod plugin;

pub use error::{CliError, WorkflowError};
pub use plugin::{ErrorKind, ErrorRecord, PluginError};
