//! `post_publisher`: compose and publish a status post.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use famp_core::api::{
    Account, ElementHandle, Plugin, PluginConfig, PluginDependency, PluginError, PluginMetadata,
    PluginOutput, Selector, Session,
};
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::login;
use crate::page::{self, ConfigExt};

pub const NAME: &str = "post_publisher";

/// Longest post the composer accepts.
pub const MAX_POST_CHARS: usize = 63_206;

const PRIVACY_OPTIONS: &[(&str, &str)] = &[
    ("public", "Public"),
    ("friends", "Friends"),
    ("only_me", "Only me"),
];

const PROBLEMATIC_PATTERNS: &[&str] = &[
    r"(?i)buy followers",
    r"(?i)buy likes",
    r"(?i)hack (password|account)",
    r"(?i)illegal",
    r"(?i)spam",
];

const COMPOSER_PROMPT: &str = "What's on your mind";
const COMPOSER_TEXTBOX: &str = "div[role='textbox'][contenteditable='true']";
const FILE_INPUT: &str = "input[type='file']";

const OPEN_WAIT: Duration = Duration::from_secs(10);
const CONTROL_WAIT: Duration = Duration::from_secs(5);
const PUBLISH_SETTLE: Duration = Duration::from_secs(5);

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();
static FLAGGED_REGEXES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn placeholder_re() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{([^}]+)\}").expect("PLACEHOLDER_REGEX is valid"))
}

fn flagged_res() -> &'static [(&'static str, Regex)] {
    FLAGGED_REGEXES.get_or_init(|| {
        PROBLEMATIC_PATTERNS
            .iter()
            .map(|p| (*p, Regex::new(p).expect("flagged pattern is valid")))
            .collect()
    })
}

/// Post text with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTemplate {
    source: String,
    placeholders: Vec<String>,
}

impl PostTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let placeholders = placeholder_re()
            .captures_iter(&source)
            .map(|c| c[1].to_string())
            .collect();
        Self {
            source,
            placeholders,
        }
    }

    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Placeholders without a value are left as written.
    pub fn render(&self, values: &BTreeMap<String, String>) -> String {
        let mut out = self.source.clone();
        for name in &self.placeholders {
            if let Some(value) = values.get(name) {
                out = out.replace(&format!("{{{name}}}"), value);
            }
        }
        out
    }
}

/// Load every `name -> template` pair from `dir/*.json`. Unreadable files are
/// logged and skipped; later files win on name clashes.
pub fn load_templates(dir: &Path) -> BTreeMap<String, PostTemplate> {
    let mut templates = BTreeMap::new();
    let pattern = dir.join("*.json");
    let entries = match glob::glob(&pattern.to_string_lossy()) {
        Ok(entries) => entries,
        Err(err) => {
            error!(plugin = NAME, dir = %dir.display(), error = %err, "bad templates dir");
            return templates;
        }
    };

    for path in entries.flatten() {
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|s| {
                serde_json::from_str::<BTreeMap<String, String>>(&s).map_err(anyhow::Error::from)
            });
        match parsed {
            Ok(map) => {
                debug!(plugin = NAME, file = %path.display(), count = map.len(), "loaded templates");
                templates.extend(map.into_iter().map(|(k, v)| (k, PostTemplate::new(v))));
            }
            Err(err) => error!(plugin = NAME, file = %path.display(), error = %err, "failed to load templates"),
        }
    }
    templates
}

/// Reject empty, oversized or flagged content.
pub fn validate_content(text: &str, has_image: bool) -> Result<(), PluginError> {
    if text.trim().is_empty() && !has_image {
        return Err(PluginError::validation(NAME, "Post content is empty"));
    }
    let chars = text.chars().count();
    if chars > MAX_POST_CHARS {
        return Err(PluginError::validation(
            NAME,
            format!("Post content exceeds {MAX_POST_CHARS} characters"),
        )
        .with_context("length", chars));
    }
    for (pattern, re) in flagged_res() {
        if re.is_match(text) {
            warn!(plugin = NAME, pattern, "post content matched a flagged pattern");
            return Err(PluginError::validation(
                NAME,
                "Post content contains potentially problematic text",
            )
            .with_context("pattern", *pattern));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PostType {
    Text,
    Image,
    Link,
}

impl PostType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Link => "link",
        }
    }
}

#[derive(Debug, Default)]
pub struct PostPublisherPlugin;

impl PostPublisherPlugin {
    pub fn new() -> Self {
        Self
    }

    fn post_text(&self, config: &PluginConfig) -> String {
        let Some(template) = config.opt_str("template") else {
            return config.str_or("text", "").to_string();
        };

        let values: BTreeMap<String, String> = config
            .get("template_values")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let dir = page::expand_home(config.str_or("templates_dir", "~/.famp/templates"));
        let templates = load_templates(&dir);
        match templates.get(template) {
            Some(named) => named.render(&values),
            // Not a known name: the value is the template itself.
            None => PostTemplate::new(template).render(&values),
        }
    }

    async fn find(
        &self,
        session: &mut dyn Session,
        selector: Selector,
        timeout: Duration,
        status: &str,
    ) -> Result<ElementHandle, PluginError> {
        match session.wait_for(&selector, timeout).await? {
            Some(el) => Ok(el),
            None => {
                warn!(plugin = NAME, %selector, status, "composer control not found");
                Err(PluginError::execution(NAME, format!("{selector} not found"))
                    .with_context("status", status))
            }
        }
    }

    /// Best effort: returns the resulting status instead of failing the post.
    async fn set_privacy(&self, session: &mut dyn Session, privacy: &str) -> &'static str {
        let Some((_, label)) = PRIVACY_OPTIONS.iter().find(|(key, _)| *key == privacy) else {
            return "invalid_setting";
        };

        let mut current = None;
        for (_, shown) in PRIVACY_OPTIONS {
            if let Ok(Some(el)) = session.wait_for(&Selector::text(*shown), CONTROL_WAIT).await {
                current = Some(el);
                break;
            }
        }
        let Some(current) = current else {
            warn!(plugin = NAME, "privacy selector not found");
            return "selector_not_found";
        };
        if session.click(&current).await.is_err() {
            return "error";
        }

        match session.wait_for(&Selector::text(*label), CONTROL_WAIT).await {
            Ok(Some(option)) => match session.click(&option).await {
                Ok(()) => "set",
                Err(err) => {
                    warn!(plugin = NAME, error = %err, "privacy option click failed");
                    "error"
                }
            },
            _ => {
                warn!(plugin = NAME, option = label, "privacy option not found");
                "option_not_found"
            }
        }
    }
}

#[async_trait]
impl Plugin for PostPublisherPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(NAME, "0.1.0")
            .with_description("Publishes text, image and link posts")
            .with_categories(["publishing"])
            .with_tags(["post", "template", "content"])
            .with_author("famp contributors")
    }

    fn requires(&self) -> Vec<PluginDependency> {
        vec![PluginDependency::required(login::NAME)]
    }

    fn default_config(&self) -> PluginConfig {
        json!({
            "text": "",
            "template": null,
            "template_values": {},
            "templates_dir": "~/.famp/templates",
            "image_path": null,
            "link": null,
            "privacy": "public",
            "validate_content": true,
            "home_url": page::HOME_URL,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn validate_config(&self, config: &PluginConfig) -> Result<(), PluginError> {
        for key in ["text", "template", "templates_dir", "image_path", "link", "home_url"] {
            page::require_string(NAME, config, key)?;
        }
        let privacy: Vec<&str> = PRIVACY_OPTIONS.iter().map(|(k, _)| *k).collect();
        page::require_one_of(NAME, config, "privacy", &privacy)?;
        page::require_bool(NAME, config, "validate_content")?;
        match config.get("template_values") {
            None | Some(Value::Object(_)) => Ok(()),
            Some(other) => Err(PluginError::config(NAME, "'template_values' must be a table")
                .with_context("value", other.clone())),
        }
    }

    async fn run(
        &self,
        session: &mut dyn Session,
        account: &Account,
        config: &PluginConfig,
    ) -> Result<PluginOutput, PluginError> {
        info!(plugin = NAME, account = %account.account_id, "starting post publisher");

        session.navigate(config.str_or("home_url", page::HOME_URL)).await?;
        if !page::is_logged_in(session).await {
            return Err(PluginError::authentication(
                NAME,
                "Account is not logged in. Run the login plugin first.",
            )
            .with_context("status", "not_logged_in"));
        }

        let text = self.post_text(config);
        let image = config.opt_str("image_path");
        let link = config.opt_str("link");
        if config.bool_or("validate_content", true) {
            validate_content(&text, image.is_some())?;
        }

        let post_type = match (image, link) {
            (Some(_), _) => PostType::Image,
            (None, Some(_)) => PostType::Link,
            (None, None) => PostType::Text,
        };

        if let Some(path) = image {
            if tokio::fs::metadata(path).await.is_err() {
                return Err(PluginError::validation(NAME, format!("Image file not found: {path}"))
                    .with_context("status", "image_not_found"));
            }
        }

        let composer = self
            .find(session, Selector::text(COMPOSER_PROMPT), OPEN_WAIT, "create_post_not_found")
            .await?;
        session.click(&composer).await?;

        let textbox = self
            .find(session, Selector::css(COMPOSER_TEXTBOX), OPEN_WAIT, "textarea_not_found")
            .await?;
        let body = match link {
            Some(link) if post_type == PostType::Link => format!("{text}\n\n{link}"),
            _ => text.clone(),
        };
        session.send_keys(&textbox, &body).await?;

        if let Some(path) = image {
            let photo = self
                .find(session, Selector::text("Photo/Video"), CONTROL_WAIT, "photo_button_not_found")
                .await?;
            session.click(&photo).await?;
            let input = self
                .find(session, Selector::css(FILE_INPUT), CONTROL_WAIT, "file_input_not_found")
                .await?;
            session.send_keys(&input, path).await?;
        }

        let privacy = config.str_or("privacy", "public").to_lowercase();
        let privacy_status = self.set_privacy(session, &privacy).await;

        let post = self
            .find(session, Selector::exact_text("Post"), CONTROL_WAIT, "post_button_not_found")
            .await?;
        session.click(&post).await?;
        tokio::time::sleep(PUBLISH_SETTLE).await;

        info!(plugin = NAME, account = %account.account_id, post_type = post_type.as_str(), "post published");

        let mut out = PluginOutput::new();
        out.insert("posted".into(), json!(true));
        out.insert("status".into(), json!("posted"));
        out.insert("post_type".into(), json!(post_type.as_str()));
        out.insert("text".into(), json!(body));
        out.insert("privacy".into(), json!(privacy));
        out.insert("privacy_status".into(), json!(privacy_status));
        if let Some(path) = image {
            out.insert("image_path".into(), json!(path));
        }
        if post_type == PostType::Link {
            out.insert("link".into(), json!(link));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replay::ReplaySession;
    use famp_core::api::ErrorKind;
    use pretty_assertions::assert_eq;

    fn composer(extra: Vec<Value>) -> ReplaySession {
        let mut elements = vec![
            json!({"css": ["a[href*='/me/']"]}),
            json!({"text": "What's on your mind, Ann?"}),
            json!({"css": [COMPOSER_TEXTBOX]}),
            json!({"text": "Friends"}),
            json!({"text": "Only me"}),
            json!({"text": " Post "}),
            json!({"text": "Post settings"}),
        ];
        elements.extend(extra);
        ReplaySession::from_json(
            &json!({"pages": {"https://www.facebook.com/": {"elements": elements}}}).to_string(),
        )
        .unwrap()
    }

    fn config(extra: Value) -> PluginConfig {
        let mut cfg = PostPublisherPlugin::new().default_config();
        cfg.extend(extra.as_object().cloned().unwrap());
        cfg
    }

    #[test]
    fn test_template_render_keeps_unknown_placeholders() {
        let template = PostTemplate::new("Hello {name}! Welcome to {platform}.");
        assert_eq!(template.placeholders(), ["name", "platform"]);
        let values = BTreeMap::from([("name".to_string(), "Ann".to_string())]);
        assert_eq!(template.render(&values), "Hello Ann! Welcome to {platform}.");
    }

    #[test]
    fn test_load_templates_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("sample.json"),
            r#"{"greeting": "Hello {name}!"}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();

        let templates = load_templates(dir.path());
        assert_eq!(templates.len(), 1);
        assert_eq!(templates["greeting"].placeholders(), ["name"]);
    }

    #[test]
    fn test_validate_content() {
        assert_eq!(validate_content("  ", false).unwrap_err().kind, ErrorKind::Validation);
        assert!(validate_content("", true).is_ok());
        assert!(validate_content(&"x".repeat(MAX_POST_CHARS), false).is_ok());
        let err = validate_content(&"x".repeat(MAX_POST_CHARS + 1), false).unwrap_err();
        assert_eq!(err.context["length"], MAX_POST_CHARS + 1);
        assert!(validate_content("Buy Followers now", false).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_templated_text_post() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("t.json"), r#"{"greeting": "Hi {name}"}"#).unwrap();
        let mut session = composer(vec![]);
        let plugin = PostPublisherPlugin::new();
        let cfg = config(json!({
            "template": "greeting",
            "template_values": {"name": "Ann"},
            "templates_dir": dir.path().display().to_string(),
            "privacy": "only_me",
        }));

        let out = plugin.run(&mut session, &Account::new("acct1", "a@x"), &cfg).await.unwrap();

        assert_eq!(out["posted"], true);
        assert_eq!(out["post_type"], "text");
        assert_eq!(out["text"], "Hi Ann");
        assert_eq!(out["privacy_status"], "set");
        assert_eq!(session.typed()[0].1, "Hi Ann");
        // The exact "Post" button was clicked, not "Post settings".
        assert_eq!(
            session.history().last().map(String::as_str),
            Some("click https://www.facebook.com/#5")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_link_post_appends_link() {
        let mut session = composer(vec![]);
        let plugin = PostPublisherPlugin::new();
        let cfg = config(json!({"text": "Read this", "link": "https://example.com"}));

        let out = plugin.run(&mut session, &Account::new("acct1", "a@x"), &cfg).await.unwrap();

        assert_eq!(out["post_type"], "link");
        assert_eq!(out["text"], "Read this\n\nhttps://example.com");
    }

    #[tokio::test(start_paused = true)]
    async fn test_image_post_uploads_file() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("cat.jpg");
        std::fs::write(&image, b"jpg").unwrap();
        let mut session = composer(vec![
            json!({"text": "Photo/Video"}),
            json!({"css": [FILE_INPUT]}),
        ]);
        let plugin = PostPublisherPlugin::new();
        let path = image.display().to_string();
        let cfg = config(json!({"image_path": path}));

        let out = plugin.run(&mut session, &Account::new("acct1", "a@x"), &cfg).await.unwrap();

        assert_eq!(out["post_type"], "image");
        assert_eq!(session.typed().last().unwrap().1, path);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_composer_fails_with_status() {
        let mut session = ReplaySession::from_json(
            &json!({"pages": {"https://www.facebook.com/": {"elements": [{"css": ["a[href*='/me/']"]}]}}})
                .to_string(),
        )
        .unwrap();
        let plugin = PostPublisherPlugin::new();
        let err = plugin
            .run(&mut session, &Account::new("acct1", "a@x"), &config(json!({"text": "hi"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Execution);
        assert_eq!(err.context["status"], "create_post_not_found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_content_never_opens_composer() {
        let mut session = composer(vec![]);
        let plugin = PostPublisherPlugin::new();
        let err = plugin
            .run(&mut session, &Account::new("acct1", "a@x"), &config(json!({"text": "free spam"})))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(session.typed().is_empty());
    }
}
