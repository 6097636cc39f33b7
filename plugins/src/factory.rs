use std::sync::Arc;

use famp_core::api::Plugin;

use crate::feed_scroller::{self, FeedScrollerPlugin};
use crate::login::{self, ManualLoginPlugin};
use crate::post_publisher::{self, PostPublisherPlugin};

/// Names of the plugins shipped with this crate, in registration order.
pub const BUILTIN_PLUGINS: &[&str] = &[login::NAME, feed_scroller::NAME, post_publisher::NAME];

pub fn build_plugin(name: &str) -> Option<Arc<dyn Plugin>> {
    match name {
        login::NAME => Some(Arc::new(ManualLoginPlugin::new())),
        feed_scroller::NAME => Some(Arc::new(FeedScrollerPlugin::new())),
        post_publisher::NAME => Some(Arc::new(PostPublisherPlugin::new())),
        _ => None,
    }
}

pub fn build_builtins() -> Vec<Arc<dyn Plugin>> {
    BUILTIN_PLUGINS
        .iter()
        .filter_map(|name| build_plugin(name))
        .collect()
}
