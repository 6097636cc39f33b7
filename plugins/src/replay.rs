//! Scripted [`Session`] that replays recorded pages instead of driving a browser.
//!
//! A replay script is JSON:
//!
//! ```json
//! {
//!   "start_url": "about:blank",
//!   "pages": {
//!     "https://www.facebook.com/": {
//!       "elements": [
//!         { "css": ["a[href*='/me/']"], "text": "Your profile", "attributes": { "href": "/me/" } }
//!       ],
//!       "scripts": { "extract_posts": [ { "id": "1", "author": "A", "text": "hi" } ] }
//!     },
//!     "https://www.facebook.com/login/": { "redirect": "https://www.facebook.com/checkpoint/" }
//!   },
//!   "scripts": { "scroll": null },
//!   "cookies": []
//! }
//! ```
//!
//! Elements may appear or disappear over time (`appears_after_secs`,
//! `gone_after_secs`). Scripts are matched by a `// famp:<name>` marker on their
//! first line; page scripts win over global ones. Every call is recorded in [`ReplaySession::history`].

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use famp_core::api::{Cookie, ElementHandle, Selector, Session, SessionError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

/// Prefix of the first line that names a page script.
pub const SCRIPT_MARKER: &str = "// famp:";

/// Roughly thirty years; stands in for "never".
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default = "default_start_url")]
    pub start_url: String,
    #[serde(default)]
    pub pages: BTreeMap<String, ReplayPage>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Value>,
    #[serde(default)]
    pub cookies: Vec<Cookie>,
}

fn default_start_url() -> String {
    "about:blank".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayPage {
    /// Navigating here lands on this URL instead.
    #[serde(default)]
    pub redirect: Option<String>,
    #[serde(default)]
    pub elements: Vec<ReplayElement>,
    #[serde(default)]
    pub scripts: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayElement {
    /// CSS selectors that match this element, compared verbatim.
    #[serde(default)]
    pub css: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Clicking navigates to this URL.
    #[serde(default)]
    pub navigates_to: Option<String>,
    /// Element only exists this many seconds after the session started.
    #[serde(default)]
    pub appears_after_secs: Option<f64>,
    /// Element is removed this many seconds after the session started.
    #[serde(default)]
    pub gone_after_secs: Option<f64>,
}

impl ReplayElement {
    fn matches(&self, selector: &Selector) -> bool {
        match selector {
            Selector::Css(css) => self.css.iter().any(|c| c == css),
            Selector::Text { text, best_match: true } => {
                self.text.to_lowercase().contains(&text.to_lowercase())
            }
            Selector::Text { text, best_match: false } => self.text.trim() == text,
        }
    }
}

/// [`Session`] over a [`ReplayScript`].
pub struct ReplaySession {
    script: ReplayScript,
    url: String,
    cookies: Vec<Cookie>,
    started: Instant,
    history: Vec<String>,
    typed: Vec<(String, String)>,
}

impl ReplaySession {
    pub fn new(script: ReplayScript) -> Self {
        Self {
            url: script.start_url.clone(),
            cookies: script.cookies.clone(),
            script,
            started: Instant::now(),
            history: Vec::new(),
            typed: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let script: ReplayScript = serde_json::from_str(json).context("Invalid replay script")?;
        Ok(Self::new(script))
    }

    pub async fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read replay script {:?}", path.as_ref()))?;
        Self::from_json(&content)
    }

    /// Every call made on this session, in order, e.g. `navigate https://…`.
    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// `(element handle, text)` pairs passed to `send_keys`.
    pub fn typed(&self) -> &[(String, String)] {
        &self.typed
    }

    fn record(&mut self, entry: String) {
        debug!(call = %entry, "replay session call");
        self.history.push(entry);
    }

    fn page(&self) -> Option<&ReplayPage> {
        self.script.pages.get(&self.url)
    }

    /// Offsets too large for an `Instant` land far in the future.
    fn at_offset(&self, secs: f64) -> Instant {
        Duration::try_from_secs_f64(secs.max(0.0))
            .ok()
            .and_then(|d| self.started.checked_add(d))
            .unwrap_or_else(|| self.started + FAR_FUTURE)
    }

    fn appears_at(&self, element: &ReplayElement) -> Instant {
        self.at_offset(element.appears_after_secs.unwrap_or(0.0))
    }

    fn gone_at(&self, element: &ReplayElement) -> Option<Instant> {
        element.gone_after_secs.map(|secs| self.at_offset(secs))
    }

    fn visible(&self, element: &ReplayElement) -> bool {
        let now = Instant::now();
        self.appears_at(element) <= now && self.gone_at(element).map(|g| now < g).unwrap_or(true)
    }

    fn matching(&self, selector: &Selector) -> Vec<(usize, &ReplayElement)> {
        self.page()
            .map(|page| {
                page.elements
                    .iter()
                    .enumerate()
                    .filter(|(_, el)| el.matches(selector))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn handle(&self, index: usize) -> ElementHandle {
        ElementHandle(format!("{}#{}", self.url, index))
    }

    fn resolve(&self, handle: &ElementHandle) -> Result<&ReplayElement, SessionError> {
        let not_found = || SessionError::ElementNotFound(handle.0.clone());
        let (url, index) = handle.0.rsplit_once('#').ok_or_else(not_found)?;
        if url != self.url {
            // Stale handle from a page we navigated away from.
            return Err(not_found());
        }
        let index: usize = index.parse().map_err(|_| not_found())?;
        self.page()
            .and_then(|p| p.elements.get(index))
            .ok_or_else(not_found)
    }

    fn script_result(&self, script: &str) -> Option<Value> {
        let first = script.lines().next().unwrap_or_default().trim();
        let name = first.strip_prefix(SCRIPT_MARKER)?.trim();
        self.page()
            .and_then(|p| p.scripts.get(name))
            .or_else(|| self.script.scripts.get(name))
            .cloned()
    }
}

#[async_trait]
impl Session for ReplaySession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        self.record(format!("navigate {url}"));
        let landed = self
            .script
            .pages
            .get(url)
            .and_then(|p| p.redirect.clone())
            .unwrap_or_else(|| url.to_string());
        self.url = landed;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.url.clone())
    }

    async fn wait_for(
        &mut self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>, SessionError> {
        self.record(format!("wait_for {selector}"));
        let deadline = Instant::now() + timeout;

        // Earliest element that is visible now, or becomes visible before the deadline.
        let now = Instant::now();
        let mut best: Option<(usize, Instant)> = None;
        for (index, el) in self.matching(selector) {
            let at = self.appears_at(el).max(now);
            let still_there = self.gone_at(el).map(|g| at < g).unwrap_or(true);
            if at <= deadline && still_there && best.map(|(_, b)| at < b).unwrap_or(true) {
                best = Some((index, at));
            }
        }

        match best {
            Some((index, at)) => {
                tokio::time::sleep_until(at).await;
                Ok(Some(self.handle(index)))
            }
            None => {
                tokio::time::sleep_until(deadline).await;
                Ok(None)
            }
        }
    }

    async fn select_all(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, SessionError> {
        let found: Vec<usize> = self
            .matching(selector)
            .into_iter()
            .filter(|(_, el)| self.visible(el))
            .map(|(i, _)| i)
            .collect();
        Ok(found.into_iter().map(|i| self.handle(i)).collect())
    }

    async fn text(&mut self, element: &ElementHandle) -> Result<String, SessionError> {
        Ok(self.resolve(element)?.text.clone())
    }

    async fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        Ok(self.resolve(element)?.attributes.get(name).cloned())
    }

    async fn click(&mut self, element: &ElementHandle) -> Result<(), SessionError> {
        let target = self.resolve(element)?.navigates_to.clone();
        self.record(format!("click {}", element.0));
        if let Some(url) = target {
            self.url = url;
        }
        Ok(())
    }

    async fn send_keys(&mut self, element: &ElementHandle, text: &str) -> Result<(), SessionError> {
        self.resolve(element)?;
        self.record(format!("send_keys {}", element.0));
        self.typed.push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value, SessionError> {
        let first = script.lines().next().unwrap_or_default().to_string();
        self.record(format!("evaluate {first}"));
        Ok(self.script_result(script).unwrap_or(Value::Null))
    }

    async fn cookies(&mut self) -> Result<Vec<Cookie>, SessionError> {
        Ok(self.cookies.clone())
    }

    async fn set_cookies(&mut self, cookies: Vec<Cookie>) -> Result<(), SessionError> {
        self.record(format!("set_cookies {}", cookies.len()));
        for cookie in cookies {
            self.cookies
                .retain(|c| !(c.name == cookie.name && c.domain == cookie.domain && c.path == cookie.path));
            self.cookies.push(cookie);
        }
        Ok(())
    }

    async fn clear_cookies(&mut self) -> Result<(), SessionError> {
        self.record("clear_cookies".to_string());
        self.cookies.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> ReplaySession {
        ReplaySession::from_json(
            &json!({
                "pages": {
                    "https://site/": {
                        "elements": [
                            {"css": ["button.go"], "text": "Go next", "navigates_to": "https://site/next"},
                            {"css": ["span.late"], "text": "Late", "appears_after_secs": 5.0},
                            {"css": ["div.banner"], "gone_after_secs": 3.0}
                        ],
                        "scripts": {"count": 3}
                    },
                    "https://site/old": {"redirect": "https://site/"}
                },
                "scripts": {"count": 1, "title": "t"}
            })
            .to_string(),
        )
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_redirects_and_clicks() {
        let mut s = session();
        s.navigate("https://site/old").await.unwrap();
        assert_eq!(s.current_url().await.unwrap(), "https://site/");

        let button = s
            .wait_for(&Selector::text("go NEXT"), Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        s.click(&button).await.unwrap();
        assert_eq!(s.current_url().await.unwrap(), "https://site/next");

        // Handles from the previous page are stale.
        assert!(s.text(&button).await.is_err());
        assert_eq!(s.history()[0], "navigate https://site/old");
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_elements_respect_timeout() {
        let mut s = session();
        s.navigate("https://site/").await.unwrap();
        let late = Selector::css("span.late");

        assert!(s.select_all(&late).await.unwrap().is_empty());
        assert!(s.wait_for(&late, Duration::from_secs(2)).await.unwrap().is_none());
        assert!(s.wait_for(&late, Duration::from_secs(10)).await.unwrap().is_some());
        assert_eq!(s.select_all(&late).await.unwrap().len(), 1);
        // 5s have passed; the banner is gone.
        assert!(!s.exists(&Selector::css("div.banner")).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_offsets_mean_never() {
        let mut s = ReplaySession::from_json(
            &json!({
                "start_url": "https://site/",
                "pages": {"https://site/": {"elements": [
                    {"css": ["p.never"], "appears_after_secs": 1e300},
                    {"css": ["p.always"], "gone_after_secs": 1e300}
                ]}}
            })
            .to_string(),
        )
        .unwrap();
        s.navigate("https://site/").await.unwrap();

        assert!(!s.exists(&Selector::css("p.never")).await.unwrap());
        assert!(s.exists(&Selector::css("p.always")).await.unwrap());
    }

    #[tokio::test]
    async fn test_scripts_resolve_page_then_global() {
        let mut s = session();
        s.navigate("https://site/").await.unwrap();
        assert_eq!(s.evaluate("// famp:count\nreturn 0;").await.unwrap(), json!(3));
        assert_eq!(s.evaluate("// famp:title").await.unwrap(), json!("t"));
        assert_eq!(s.evaluate("document.title").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_exact_text_and_cookies() {
        let mut s = session();
        s.navigate("https://site/").await.unwrap();
        assert!(s.select_all(&Selector::exact_text("Go")).await.unwrap().is_empty());
        assert_eq!(s.select_all(&Selector::exact_text("Go next")).await.unwrap().len(), 1);

        let cookie = Cookie {
            name: "c_user".into(),
            value: "1".into(),
            domain: ".facebook.com".into(),
            path: "/".into(),
            expires: None,
            secure: true,
            http_only: true,
        };
        s.set_cookies(vec![cookie.clone(), cookie]).await.unwrap();
        assert_eq!(s.cookies().await.unwrap().len(), 1);
        s.clear_cookies().await.unwrap();
        assert!(s.cookies().await.unwrap().is_empty());
        assert!(s.screenshot(Path::new("x.png")).await.is_err());
    }
}
