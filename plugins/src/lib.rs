//! Built-in plugins and the replay session.
pub mod factory;
pub mod feed_scroller;
pub mod loader;
pub mod login;
pub mod page;
pub mod post_publisher;
pub mod replay;

pub use loader::BuiltinPluginLoader;
pub use replay::{ReplayScript, ReplaySession};
