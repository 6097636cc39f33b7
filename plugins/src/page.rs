//! Page probes and config accessors shared by the built-in plugins.

use std::path::PathBuf;
use std::time::Duration;

use famp_core::api::{PluginConfig, PluginError, Selector, Session};
use serde_json::Value;
use tracing::debug;

pub const HOME_URL: &str = "https://www.facebook.com/";
pub const LOGIN_URL: &str = "https://www.facebook.com/login/";

/// Present only when a user is signed in.
pub const LOGGED_IN_INDICATORS: &[&str] = &[
    "a[href*='/me/']",
    "div[aria-label='Your profile'] img",
    "div[data-pagelet='Stories']",
];

/// Present on the login form.
pub const LOGGED_OUT_INDICATORS: &[&str] = &[
    "form[action*='/login/']",
    "input[name='email']",
    "input[name='pass']",
    "button[name='login']",
];

/// Upper bound for any wait or delay a plugin config may ask for.
pub const MAX_WAIT_SECS: f64 = 86_400.0;

pub const CHECKPOINT_INDICATORS: &[&str] = &[
    "input[name='approvals_code']",
    "form[action*='checkpoint']",
    "div[data-testid='checkpoint']",
];

async fn any_present(session: &mut dyn Session, selectors: &[&str]) -> bool {
    for css in selectors {
        match session.exists(&Selector::css(*css)).await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(err) => debug!(selector = *css, error = %err, "indicator probe failed"),
        }
    }
    false
}

/// A probe error counts as "not logged in".
pub async fn is_logged_in(session: &mut dyn Session) -> bool {
    if any_present(session, LOGGED_OUT_INDICATORS).await {
        return false;
    }
    any_present(session, LOGGED_IN_INDICATORS).await
}

pub async fn at_checkpoint(session: &mut dyn Session) -> bool {
    if let Ok(url) = session.current_url().await {
        if url.contains("checkpoint") {
            return true;
        }
    }
    any_present(session, CHECKPOINT_INDICATORS).await
}

/// Typed reads over a plugin's effective config. Missing or mistyped keys fall
/// back to the supplied default; `validate_config` is where type errors surface.
pub trait ConfigExt {
    fn bool_or(&self, key: &str, default: bool) -> bool;
    fn u64_or(&self, key: &str, default: u64) -> u64;
    fn f64_or(&self, key: &str, default: f64) -> f64;
    /// Seconds as a `Duration`; values a `Duration` cannot hold use `default`.
    fn secs_or(&self, key: &str, default: f64) -> Duration;
    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str;
    fn opt_str(&self, key: &str) -> Option<&str>;
}

impl ConfigExt for PluginConfig {
    fn bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn u64_or(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(Value::as_u64).unwrap_or(default)
    }

    fn f64_or(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    fn secs_or(&self, key: &str, default: f64) -> Duration {
        Duration::try_from_secs_f64(self.f64_or(key, default))
            .or_else(|_| Duration::try_from_secs_f64(default))
            .unwrap_or_default()
    }

    fn str_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(Value::as_str).unwrap_or(default)
    }

    fn opt_str(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

pub fn require_bool(plugin: &str, config: &PluginConfig, key: &str) -> Result<(), PluginError> {
    match config.get(key) {
        None | Some(Value::Bool(_)) => Ok(()),
        Some(other) => Err(invalid(plugin, key, "a boolean", other)),
    }
}

/// Seconds in `(0, MAX_WAIT_SECS]`, or `[0, MAX_WAIT_SECS]` with `allow_zero`.
pub fn require_secs(
    plugin: &str,
    config: &PluginConfig,
    key: &str,
    allow_zero: bool,
) -> Result<(), PluginError> {
    let Some(v) = config.get(key) else {
        return Ok(());
    };
    let in_range = v
        .as_f64()
        .map(|n| (n > 0.0 || (allow_zero && n == 0.0)) && n <= MAX_WAIT_SECS)
        .unwrap_or(false);
    if in_range {
        return Ok(());
    }
    let lower = if allow_zero { "[0" } else { "(0" };
    Err(invalid(
        plugin,
        key,
        &format!("a number of seconds in {lower}, {MAX_WAIT_SECS}]"),
        v,
    ))
}

/// Integer >= 1 when present.
pub fn require_count(plugin: &str, config: &PluginConfig, key: &str) -> Result<(), PluginError> {
    match config.get(key) {
        None => Ok(()),
        Some(v) if v.as_u64().map(|n| n >= 1).unwrap_or(false) => Ok(()),
        Some(other) => Err(invalid(plugin, key, "a positive integer", other)),
    }
}

pub fn require_string(plugin: &str, config: &PluginConfig, key: &str) -> Result<(), PluginError> {
    match config.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(invalid(plugin, key, "a string", other)),
    }
}

pub fn require_one_of(
    plugin: &str,
    config: &PluginConfig,
    key: &str,
    allowed: &[&str],
) -> Result<(), PluginError> {
    match config.get(key) {
        None => Ok(()),
        Some(Value::String(s)) if allowed.contains(&s.as_str()) => Ok(()),
        Some(other) => Err(invalid(plugin, key, &format!("one of {allowed:?}"), other)),
    }
}

fn invalid(plugin: &str, key: &str, expected: &str, got: &Value) -> PluginError {
    PluginError::config(plugin, format!("'{key}' must be {expected}"))
        .with_context("key", key)
        .with_context("value", got.clone())
}

/// Expand a leading `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySession;
    use serde_json::json;

    fn config(v: Value) -> PluginConfig {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_config_accessors_fall_back_on_wrong_types() {
        let cfg = config(json!({"n": 3, "flag": "yes", "s": "  ", "f": 1.5}));
        assert_eq!(cfg.u64_or("n", 1), 3);
        assert!(cfg.bool_or("flag", true));
        assert_eq!(cfg.opt_str("s"), None);
        assert_eq!(cfg.f64_or("f", 0.0), 1.5);
        assert_eq!(cfg.str_or("missing", "d"), "d");
    }

    #[test]
    fn test_secs_or_never_panics_on_out_of_range_values() {
        let cfg = config(json!({"ok": 1.5, "huge": 1e300, "neg": -1.0}));
        assert_eq!(cfg.secs_or("ok", 5.0), Duration::from_millis(1500));
        assert_eq!(cfg.secs_or("huge", 5.0), Duration::from_secs(5));
        assert_eq!(cfg.secs_or("neg", 2.0), Duration::from_secs(2));
        assert_eq!(cfg.secs_or("missing", 3.0), Duration::from_secs(3));
    }

    #[test]
    fn test_validators() {
        let cfg = config(json!({
            "n": 0, "b": 1, "p": "public", "q": "everyone",
            "half": 0.5, "ten": 10, "huge": 1e300
        }));
        assert!(require_secs("x", &cfg, "n", false).is_err());
        assert!(require_secs("x", &cfg, "n", true).is_ok());
        assert!(require_secs("x", &cfg, "half", false).is_ok());
        assert!(require_secs("x", &cfg, "huge", true).is_err());
        assert!(require_secs("x", &cfg, "missing", false).is_ok());
        assert!(require_count("x", &cfg, "ten").is_ok());
        assert!(require_count("x", &cfg, "half").is_err());
        assert!(require_count("x", &cfg, "n").is_err());
        assert!(require_bool("x", &cfg, "b").is_err());
        assert!(require_one_of("x", &cfg, "p", &["public"]).is_ok());
        let err = require_one_of("x", &cfg, "q", &["public"]).unwrap_err();
        assert_eq!(err.context["key"], "q");
    }

    #[tokio::test]
    async fn test_login_probes() {
        let mut session = ReplaySession::from_json(
            &json!({
                "pages": {
                    "https://in/": {"elements": [{"css": ["a[href*='/me/']"]}]},
                    "https://out/": {"elements": [
                        {"css": ["a[href*='/me/']"]},
                        {"css": ["input[name='email']"]}
                    ]},
                    "https://www.facebook.com/checkpoint/1": {}
                }
            })
            .to_string(),
        )
        .unwrap();

        session.navigate("https://in/").await.unwrap();
        assert!(is_logged_in(&mut session).await);
        session.navigate("https://out/").await.unwrap();
        assert!(!is_logged_in(&mut session).await);
        session.navigate("https://www.facebook.com/checkpoint/1").await.unwrap();
        assert!(at_checkpoint(&mut session).await);
    }
}
