//! Browser session capability consumed by plugins.
//!
//! The driver behind a session (navigation, DOM queries, cookies) lives outside this
//! crate. Plugins only see this trait, so a session can be a live browser tab, a
//! replayed page script, or a test stub.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorKind, PluginError};

/// How to locate an element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    /// CSS selector.
    Css(String),
    /// Visible text. With `best_match` any element whose text contains `text`
    /// (case-insensitive) matches; without it the trimmed text must be equal.
    Text { text: String, best_match: bool },
}

impl Selector {
    pub fn css(s: impl Into<String>) -> Self {
        Self::Css(s.into())
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text {
            text: s.into(),
            best_match: true,
        }
    }

    pub fn exact_text(s: impl Into<String>) -> Self {
        Self::Text {
            text: s.into(),
            best_match: false,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(s) => write!(f, "css:{s}"),
            Self::Text { text, .. } => write!(f, "text:{text}"),
        }
    }
}

/// Opaque driver-side element reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle(pub String);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub http_only: bool,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("timed out after {timeout_ms}ms waiting for {selector}")]
    Timeout { selector: String, timeout_ms: u64 },

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("capability not supported by this session: {0}")]
    Unsupported(&'static str),

    #[error("driver error: {0}")]
    Driver(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Navigation { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Driver(_) => ErrorKind::Resource,
            Self::ElementNotFound(_) | Self::Script(_) | Self::Unsupported(_) => {
                ErrorKind::Execution
            }
        }
    }
}

impl From<SessionError> for PluginError {
    /// The plugin name is left empty; callers attribute it with `PluginError::for_plugin`.
    fn from(err: SessionError) -> Self {
        PluginError::new(err.kind(), "", err.to_string())
    }
}

/// Capabilities a plugin may use on the target site.
///
/// A session is owned by exactly one plugin/workflow run at a time.
#[async_trait]
pub trait Session: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    async fn current_url(&mut self) -> Result<String, SessionError>;

    /// Wait until an element matching `selector` exists. `Ok(None)` when the
    /// timeout passes without a match.
    async fn wait_for(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError>;

    /// All elements currently matching `selector`.
    async fn select_all(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, SessionError>;

    async fn text(&mut self, element: &ElementHandle) -> Result<String, SessionError>;

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError>;

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError>;

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), SessionError>;

    async fn evaluate(&mut self, script: &str) -> Result<Value, SessionError>;

    async fn cookies(&mut self) -> Result<Vec<Cookie>, SessionError>;

    async fn set_cookies(&mut self, cookies: Vec<Cookie>) -> Result<(), SessionError>;

    async fn clear_cookies(&mut self) -> Result<(), SessionError>;

    async fn screenshot(&mut self, _path: &Path) -> Result<(), SessionError> {
        Err(SessionError::Unsupported("screenshot"))
    }

    /// Convenience: does any element match right now?
    async fn exists(&mut self, selector: &Selector) -> Result<bool, SessionError> {
        Ok(!self.select_all(selector).await?.is_empty())
    }
}
