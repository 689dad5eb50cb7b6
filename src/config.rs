use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reddit::{CommentSort, DEFAULT_BASE_URL, DEFAULT_USER_AGENT};

const DEFAULT_ENV_PREFIX: &str = "REDDIT_COMMENTS";

pub const DEFAULT_COMMENTS_CACHE_EXPIRATION: u32 = 5;
pub const SUBMISSION_CACHE_EXPIRATION: u32 = 24 * 60;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config: subreddit is required")]
    MissingSubreddit,
    #[error("config: page url is required")]
    MissingUrl,
    #[error("config: invalid base url {0}")]
    InvalidBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    #[default]
    Inline,
    Iframe,
}

/// Options recognised by a widget. Only `subreddit` is mandatory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WidgetOptions {
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_comments_cache_expiration")]
    pub comments_cache_expiration: u32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    #[serde(default)]
    pub sort: Option<CommentSort>,
    #[serde(default)]
    pub embed: EmbedMode,
    #[serde(default = "default_css_href")]
    pub css_href: String,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self {
            subreddit: String::new(),
            url: None,
            comments_cache_expiration: default_comments_cache_expiration(),
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            cache_path: None,
            sort: None,
            embed: EmbedMode::default(),
            css_href: default_css_href(),
        }
    }
}

impl WidgetOptions {
    pub fn for_subreddit(subreddit: impl Into<String>) -> Self {
        Self {
            subreddit: subreddit.into(),
            ..Self::default()
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.subreddit.trim().is_empty() {
            return Err(ConfigError::MissingSubreddit);
        }
        if self.url.as_deref().map_or(true, |url| url.trim().is_empty()) {
            return Err(ConfigError::MissingUrl);
        }
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        Ok(())
    }
}

fn default_comments_cache_expiration() -> u32 {
    DEFAULT_COMMENTS_CACHE_EXPIRATION
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

fn default_css_href() -> String {
    "reddit-comments.css".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<WidgetOptions> {
    let mut cfg = WidgetOptions::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_options(cfg, from_file);
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_options(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = apply_env(cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<WidgetOptions> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let options: WidgetOptions = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(options)
}

fn merge_options(mut base: WidgetOptions, other: WidgetOptions) -> WidgetOptions {
    if !other.subreddit.is_empty() {
        base.subreddit = other.subreddit;
    }
    if other.url.is_some() {
        base.url = other.url;
    }
    base.comments_cache_expiration = other.comments_cache_expiration;
    if !other.base_url.is_empty() {
        base.base_url = other.base_url;
    }
    if !other.user_agent.is_empty() {
        base.user_agent = other.user_agent;
    }
    if other.cache_path.is_some() {
        base.cache_path = other.cache_path;
    }
    if other.sort.is_some() {
        base.sort = other.sort;
    }
    base.embed = other.embed;
    if !other.css_href.is_empty() {
        base.css_href = other.css_href;
    }
    base
}

fn apply_env(mut cfg: WidgetOptions, prefix: &str) -> WidgetOptions {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let map: HashMap<String, String> = env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect();

    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut WidgetOptions, key: &str, value: String) {
    match key {
        "subreddit" => cfg.subreddit = value,
        "url" => cfg.url = Some(value),
        "comments_cache_expiration" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.comments_cache_expiration = parsed;
            }
        }
        "base_url" => cfg.base_url = value,
        "user_agent" => cfg.user_agent = value,
        "cache_path" => cfg.cache_path = Some(PathBuf::from(value)),
        "sort" => {
            if let Ok(sort) = serde_yaml::from_str::<CommentSort>(&value) {
                cfg.sort = Some(sort);
            }
        }
        "embed" => {
            if let Ok(embed) = serde_yaml::from_str::<EmbedMode>(&value) {
                cfg.embed = embed;
            }
        }
        "css_href" => cfg.css_href = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("reddit-comments").join("config.yaml"))
}
