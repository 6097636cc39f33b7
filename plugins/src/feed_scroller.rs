//! `feed_scroller`: scroll the home feed and collect the posts that pass by.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use famp_core::api::{
    Account, Plugin, PluginConfig, PluginDependency, PluginError, PluginMetadata, PluginOutput,
    Session,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::login;
use crate::page::{self, ConfigExt};

pub const NAME: &str = "feed_scroller";

const EXPORT_FORMATS: &[&str] = &["json", "csv"];

pub const EXTRACT_POSTS_SCRIPT: &str = r#"// famp:extract_posts
return Array.from(document.querySelectorAll("div[role='article']")).map((el) => ({
  id: el.getAttribute('aria-posinset') || null,
  author: el.querySelector('h4 span')?.textContent || '',
  text: el.querySelector("div[data-ad-preview='message']")?.textContent || '',
  images: Array.from(el.querySelectorAll('img')).map((i) => i.src).filter((s) => s.includes('scontent')),
  reactions: { likes: el.querySelector("span[aria-label*='Like']")?.textContent || '' },
  comments: Array.from(el.querySelectorAll('ul > li')).map((li) => li.textContent),
}));"#;

pub const SCROLL_SCRIPT: &str = "// famp:scroll\nwindow.scrollBy(0, window.innerHeight);";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub reactions: BTreeMap<String, String>,
    #[serde(default)]
    pub comments: Vec<String>,
}

impl FeedPost {
    fn dedup_key(&self) -> String {
        match &self.id {
            Some(id) if !id.is_empty() => format!("id:{id}"),
            _ => format!("content:{}\u{1f}{}", self.author, self.text),
        }
    }

    fn has_content(&self) -> bool {
        !self.text.trim().is_empty() || !self.images.is_empty()
    }

    /// Sum of the leading numbers of each reaction label, e.g. "12 likes".
    pub fn reaction_count(&self) -> u64 {
        self.reactions
            .values()
            .filter_map(|v| v.split_whitespace().next())
            .filter_map(|n| n.replace(',', "").parse::<u64>().ok())
            .sum()
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    author: &'a str,
    text: &'a str,
    image_count: usize,
    reaction_count: u64,
}

/// Accumulates posts across scrolls, dropping repeats.
#[derive(Debug, Default)]
struct PostCollector {
    seen: HashSet<String>,
    posts: Vec<FeedPost>,
    max: usize,
}

impl PostCollector {
    fn new(max: usize) -> Self {
        Self {
            max,
            ..Self::default()
        }
    }

    /// Returns how many posts were new.
    fn extend(&mut self, batch: Vec<FeedPost>) -> usize {
        let before = self.posts.len();
        for post in batch {
            if self.is_full() {
                break;
            }
            if post.has_content() && self.seen.insert(post.dedup_key()) {
                self.posts.push(post);
            }
        }
        self.posts.len() - before
    }

    fn is_full(&self) -> bool {
        self.posts.len() >= self.max
    }
}

#[derive(Debug, Default)]
pub struct FeedScrollerPlugin;

impl FeedScrollerPlugin {
    pub fn new() -> Self {
        Self
    }

    async fn extract_posts(
        &self,
        session: &mut dyn Session,
        config: &PluginConfig,
    ) -> Result<Vec<FeedPost>, PluginError> {
        let raw = session.evaluate(EXTRACT_POSTS_SCRIPT).await?;
        let items = match raw {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(PluginError::execution(NAME, "post extraction returned a non-array")
                    .with_context("value", other))
            }
        };

        let include_images = config.bool_or("include_images", true);
        let include_reactions = config.bool_or("include_reactions", true);
        let include_comments = config.bool_or("include_comments", false);

        let mut posts = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<FeedPost>(item) {
                Ok(mut post) => {
                    if !include_images {
                        post.images.clear();
                    }
                    if !include_reactions {
                        post.reactions.clear();
                    }
                    if !include_comments {
                        post.comments.clear();
                    }
                    posts.push(post);
                }
                Err(err) => debug!(plugin = NAME, error = %err, "skipping malformed post"),
            }
        }
        Ok(posts)
    }
}

/// Write `posts` to `dir` as `feed_<account>_<timestamp>.<format>`.
pub async fn export_posts(
    posts: &[FeedPost],
    dir: &Path,
    account_id: &str,
    format: &str,
) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create export dir {dir:?}"))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("feed_{account_id}_{stamp}.{format}"));

    let bytes = match format {
        "json" => serde_json::to_vec_pretty(posts)?,
        "csv" => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            for post in posts {
                writer.serialize(CsvRow {
                    timestamp: post.timestamp.to_rfc3339(),
                    author: &post.author,
                    text: &post.text,
                    image_count: post.images.len(),
                    reaction_count: post.reaction_count(),
                })?;
            }
            writer.into_inner().context("Failed to flush csv")?
        }
        other => anyhow::bail!("unsupported export format '{other}'"),
    };

    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Failed to write {path:?}"))?;
    Ok(path)
}

#[async_trait]
impl Plugin for FeedScrollerPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn metadata(&self) -> PluginMetadata {
        PluginMetadata::new(NAME, "0.1.0")
            .with_description("Scrolls the news feed and collects post data")
            .with_categories(["scraping", "feed"])
            .with_tags(["feed", "scroll", "export"])
            .with_author("famp contributors")
    }

    fn requires(&self) -> Vec<PluginDependency> {
        vec![PluginDependency::optional(login::NAME)]
    }

    fn default_config(&self) -> PluginConfig {
        json!({
            "scroll_count": 5,
            "scroll_delay_secs": 2,
            "data_collection": true,
            "export_format": "json",
            "export_dir": "~/.famp/data/feed",
            "max_posts": 50,
            "include_images": true,
            "include_reactions": true,
            "include_comments": false,
            "feed_url": page::HOME_URL,
        })
        .as_object()
        .cloned()
        .unwrap_or_default()
    }

    fn validate_config(&self, config: &PluginConfig) -> Result<(), PluginError> {
        if let Some(v) = config.get("scroll_count") {
            if v.as_u64().is_none() {
                return Err(PluginError::config(NAME, "'scroll_count' must be a non-negative integer")
                    .with_context("value", v.clone()));
            }
        }
        page::require_count(NAME, config, "max_posts")?;
        page::require_secs(NAME, config, "scroll_delay_secs", true)?;
        page::require_one_of(NAME, config, "export_format", EXPORT_FORMATS)?;
        for key in [
            "data_collection",
            "include_images",
            "include_reactions",
            "include_comments",
        ] {
            page::require_bool(NAME, config, key)?;
        }
        page::require_string(NAME, config, "export_dir")?;
        page::require_string(NAME, config, "feed_url")?;
        Ok(())
    }

    async fn run(
        &self,
        session: &mut dyn Session,
        account: &Account,
        config: &PluginConfig,
    ) -> Result<PluginOutput, PluginError> {
        info!(plugin = NAME, account = %account.account_id, "starting feed scroller");

        session.navigate(config.str_or("feed_url", page::HOME_URL)).await?;
        if !page::is_logged_in(session).await {
            warn!(plugin = NAME, account = %account.account_id, "not logged in");
            return Err(PluginError::authentication(
                NAME,
                "Account is not logged in. Run the login plugin first.",
            )
            .with_context("status", "not_logged_in"));
        }

        let scroll_count = config.u64_or("scroll_count", 5);
        let delay = config.secs_or("scroll_delay_secs", 2.0);
        let collect = config.bool_or("data_collection", true);
        let mut collector = PostCollector::new(config.u64_or("max_posts", 50) as usize);

        let mut scrolls = 0;
        for i in 0..scroll_count {
            scrolls = i + 1;
            if collect {
                let batch = self.extract_posts(session, config).await?;
                let added = collector.extend(batch);
                info!(plugin = NAME, scroll = scrolls, added, "collected posts");
                if collector.is_full() {
                    info!(plugin = NAME, max = collector.max, "reached maximum post count");
                    break;
                }
            }
            session.evaluate(SCROLL_SCRIPT).await?;
            tokio::time::sleep(delay).await;
        }

        let mut export_path = Value::Null;
        if collect && !collector.posts.is_empty() {
            let dir = page::expand_home(config.str_or("export_dir", "~/.famp/data/feed"));
            let format = config.str_or("export_format", "json").to_lowercase();
            match export_posts(&collector.posts, &dir, &account.account_id, &format).await {
                Ok(path) => {
                    info!(plugin = NAME, path = %path.display(), posts = collector.posts.len(), "exported posts");
                    export_path = json!(path.display().to_string());
                }
                Err(err) => error!(plugin = NAME, error = %err, "export failed"),
            }
        }

        let mut out = PluginOutput::new();
        out.insert("status".into(), json!("completed"));
        out.insert("posts_collected".into(), json!(collector.posts.len()));
        out.insert("scrolls_performed".into(), json!(scrolls));
        out.insert("export_path".into(), export_path);
        Ok(out)
    }
}
