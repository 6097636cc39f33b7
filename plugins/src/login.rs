//! `manual_login`: bring a session to a logged-in state with a human at the keyboard.
//!
//! The plugin never submits credentials itself. It can pre-fill the email (and,
//! when explicitly enabled, the password) and then polls the page until the user
//! finishes, a security checkpoint is cleared, or the wait times out.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use famp_core::api::{
    Account, Plugin, PluginConfig, PluginError, PluginMetadata, PluginOutput, Selector, Session,
};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::page::{self, ConfigExt};

pub const NAME: &str = "manual_login";

const FIELD_WAIT: Duration = Duration::from_secs(10);

const LOGIN_ERROR_SELECTORS: &[&str] = &[
    "div.login_error_box",
    "div._9ay7",
    "div[role='alert']",
    "#error_box",
];

#[derive(Debug, Default)]
pub struct ManualLoginPlugin;

impl ManualLoginPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn fill(
        &self,
        session: &mut dyn Session,
        css: &str,
        value: &str,
    ) -> Result<bool, PluginError> {
        match session.wait_for(&Selector::css(css), FIELD_WAIT).await? {
            Some(field) => {
                session.send_keys(&field, value).await?;
                Ok(true)
            }
            None => {
                warn!(plugin = NAME, field = css, "login field not found; leaving it to the user");
                Ok(false)
            }
        }
    }

    /// Poll until logged in. Returns the last observed status on timeout.
    async fn wait_for_login(
        &self,
        session: &mut dyn Session,
        timeout: Duration,
        interval: Duration,
    ) -> (bool, &'static str) {
        let deadline = Instant::now() + timeout;
        let mut status = "timeout";
        loop {
            if page::at_checkpoint(session).await && status != "checkpoint" {
                info!(plugin = NAME, "security checkpoint detected; waiting for verification");
                status = "checkpoint";
            }
            if page::is_logged_in(session).await {
                return (true, "success");
            }
            let now = Instant::now();
            if now >= deadline {
                return (false, status);
            }
            debug!(plugin = NAME, remaining_secs = (deadline - now).as_secs(), "still waiting for login");
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    async fn login_error(&self, session: &mut dyn Session) -> Option<String> {
        for css in LOGIN_ERROR_SELECTORS {
            let Ok(found) = session.select_all(&Selector::css(*css)).await else {
                continue;
            };
            if let Some(el) = found.first() {
                if let Ok(text) = session.text(el).await {
                    let text = text.trim();
                    if !text.is_empty() {
                        return Some(text.to_string());
                    }
                }
            }
        }
        None
    }

    async fn capture(&self, session: &mut dyn Session, dir: &str, account: &Account) {
        let file = format!(
            "login_{}_{}.png",
            account.account_id,
            Utc::now().format("%Y%m%d_%H%M%S")
        );
        let path = page::expand_home(dir).join(file);
        if let Err(err) = save_screenshot(session, &path).await {
            warn!(plugin = NAME, path = %path.display(), error = %err, "screenshot skipped");
        }
    }
}

async fn save_screenshot(session: &mut dyn Session, path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    session.screenshot(path).await?;
    Ok(())
}

fn output(logged_in: bool, status: &str, message: &str, cookie_count: usize) -> PluginOutput {
    let mut out = PluginOutput::new();
    out.insert("logged_in".into(), json!(logged_in));
    out.insert("status".into(), json!(status));
    out.insert("message".into(), json!(message));
    out.insert("cookie_count".into(), json!(cookie_count));
    out
}

#[async_trait]
impl Plugin for ManualLoginPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(NAME, "0.1.0")
            .with_description("Guides through a manual login and verifies the result")
            .with_categories(["authentication"])
            .with_tags(["login", "manual", "session"])
            .with_author("famp contributors")
    }

    fn default_config(&self) -> PluginConfig {
        json!({
            "wait_timeout_secs": 300,
            "check_interval_secs": 5,
            "auto_fill_email": true,
            "auto_fill_password": false,
            "skip_if_logged_in": true,
            "home_url": page::HOME_URL,
            "login_url": page::LOGIN_URL,
            "screenshot_dir": null,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn validate_config(&self, config: &PluginConfig) -> Result<(), PluginError> {
        page::require_secs(NAME, config, "wait_timeout_secs", false)?;
        page::require_secs(NAME, config, "check_interval_secs", false)?;
        for key in ["auto_fill_email", "auto_fill_password", "skip_if_logged_in"] {
            page::require_bool(NAME, config, key)?;
        }
        for key in ["home_url", "login_url", "screenshot_dir"] {
            page::require_string(NAME, config, key)?;
        }
        Ok(())
    }

    async fn run(
        &self,
        session: &mut dyn Session,
        account: &Account,
        config: &PluginConfig,
    ) -> Result<PluginOutput, PluginError> {
        info!(plugin = NAME, account = %account.account_id, "starting manual login");

        session.navigate(config.str_or("home_url", page::HOME_URL)).await?;
        if page::is_logged_in(session).await {
            info!(plugin = NAME, account = %account.account_id, "already logged in");
            if config.bool_or("skip_if_logged_in", true) {
                let cookies = session.cookies().await?.len();
                return Ok(output(
                    true,
                    "already_logged_in",
                    "Account was already logged in, skipping login process",
                    cookies,
                ));
            }
        }

        session.navigate(config.str_or("login_url", page::LOGIN_URL)).await?;

        if config.bool_or("auto_fill_email", true) && !account.email.is_empty() {
            self.fill(session, "input[name='email']", &account.email).await?;
        }
        if config.bool_or("auto_fill_password", false) && !account.password.is_empty() {
            self.fill(session, "input[name='pass']", account.password.expose())
                .await?;
        }

        info!(
            plugin = NAME,
            email = %account.email,
            two_factor = account.has_two_factor(),
            "manual login required; complete it in the browser"
        );

        let timeout_secs = config.f64_or("wait_timeout_secs", 300.0);
        let (logged_in, status) = self
            .wait_for_login(
                session,
                config.secs_or("wait_timeout_secs", 300.0),
                config.secs_or("check_interval_secs", 5.0),
            )
            .await;

        if !logged_in {
            let mut err = PluginError::authentication(
                NAME,
                format!("Login not completed within {timeout_secs} seconds"),
            )
            .with_context("status", status)
            .with_context("wait_timeout_secs", timeout_secs);
            if let Some(reason) = self.login_error(session).await {
                err = err.with_context("login_error", reason);
            }
            warn!(plugin = NAME, account = %account.account_id, status, "manual login failed");
            return Err(err);
        }

        if let Some(dir) = config.opt_str("screenshot_dir") {
            self.capture(session, dir, account).await;
        }

        let cookies = session.cookies().await?.len();
        info!(plugin = NAME, account = %account.account_id, cookies, "manual login completed");
        Ok(output(true, status, "Login completed successfully", cookies))
    }
}
