use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::USER_AGENT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com/";
pub const DEFAULT_USER_AGENT: &str = "reddit-comments/0.1 (+https://github.com/danielmerja/reddit-comments)";

/// The only network primitive the widget needs: GET a URL and decode JSON.
pub trait Transport: Send + Sync {
    fn get_json(&self, url: &Url) -> Result<Value>;
}

#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub user_agent: String,
    pub http_client: Option<HttpClient>,
}

pub struct HttpTransport {
    http: HttpClient,
    user_agent: String,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let user_agent = if config.user_agent.trim().is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            config.user_agent
        };
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(Duration::from_secs(20))
                .build()?,
        };
        Ok(Self { http, user_agent })
    }
}

impl Transport for HttpTransport {
    fn get_json(&self, url: &Url) -> Result<Value> {
        let resp = self
            .http
            .get(url.clone())
            .header(USER_AGENT, self.user_agent.clone())
            .send()
            .with_context(|| format!("reddit: send request to {}", url.path()))?;
        if resp.status().is_success() {
            return resp.json().context("reddit: decode response body");
        }
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        match status.as_u16() {
            401 => Err(anyhow!("reddit: unauthorized")),
            403 => Err(anyhow!("reddit: forbidden")),
            429 => Err(anyhow!("reddit: rate limited: {}", body)),
            _ => Err(anyhow!("reddit: api error {}: {}", status, body)),
        }
    }
}

/// Comment orderings accepted by the comment-listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommentSort {
    #[serde(alias = "best")]
    Confidence,
    Top,
    New,
    Controversial,
    Old,
    Qa,
}

impl CommentSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommentSort::Confidence => "confidence",
            CommentSort::Top => "top",
            CommentSort::New => "new",
            CommentSort::Controversial => "controversial",
            CommentSort::Old => "old",
            CommentSort::Qa => "qa",
        }
    }
}

/// Per-widget API client. Holds no subreddit; every call names its own.
#[derive(Clone)]
pub struct RedditClient {
    transport: Arc<dyn Transport>,
    base_url: Url,
}

impl RedditClient {
    pub fn new(transport: Arc<dyn Transport>, base_url: Option<&str>) -> Result<Self> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        let mut base_url = Url::parse(base).with_context(|| format!("reddit: invalid base url {base}"))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            transport,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn info_url(&self, page_url: &str) -> Result<Url> {
        let mut url = self.base_url.join("api/info.json")?;
        url.query_pairs_mut().append_pair("url", page_url);
        Ok(url)
    }

    pub fn comments_url(
        &self,
        subreddit: &str,
        submission_id: &str,
        sort: Option<CommentSort>,
    ) -> Result<Url> {
        let path = format!(
            "r/{}/comments/{}.json",
            normalize_subreddit(subreddit),
            submission_id
        );
        let mut url = self.base_url.join(&path)?;
        if let Some(sort) = sort {
            url.query_pairs_mut().append_pair("sort", sort.as_str());
        }
        Ok(url)
    }

    /// First submission the info endpoint associates with `page_url`.
    pub fn lookup_info(&self, page_url: &str) -> Result<Option<InfoItem>> {
        let url = self.info_url(page_url)?;
        let payload = self.transport.get_json(&url).context("reddit: info lookup")?;
        Ok(first_info_item(payload))
    }

    /// Raw comment records for one submission, as `[1].data.children`.
    pub fn comment_listing(
        &self,
        subreddit: &str,
        submission_id: &str,
        sort: Option<CommentSort>,
    ) -> Result<Vec<Value>> {
        let url = self.comments_url(subreddit, submission_id, sort)?;
        let payload = self
            .transport
            .get_json(&url)
            .context("reddit: comment listing")?;
        Ok(listing_children(payload))
    }
}

pub fn normalize_subreddit(name: &str) -> &str {
    let trimmed = name.trim().trim_start_matches('/');
    trimmed.strip_prefix("r/").unwrap_or(trimmed)
}

pub fn same_subreddit(a: &str, b: &str) -> bool {
    normalize_subreddit(a).eq_ignore_ascii_case(normalize_subreddit(b))
}

fn first_info_item(payload: Value) -> Option<InfoItem> {
    let envelope: ListingEnvelope<InfoItem> = serde_json::from_value(payload).ok()?;
    envelope.data.children.into_iter().next().map(|thing| thing.data)
}

fn listing_children(payload: Value) -> Vec<Value> {
    let Value::Array(mut elements) = payload else {
        return Vec::new();
    };
    if elements.len() < 2 {
        return Vec::new();
    }
    match elements.swap_remove(1) {
        Value::Object(mut listing) => match listing.remove("data") {
            Some(Value::Object(mut data)) => match data.remove("children") {
                Some(Value::Array(children)) => children,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingEnvelope<T> {
    #[serde(default)]
    pub kind: String,
    pub data: Listing<T>,
}

/// The subset of an info-lookup result the resolver reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoItem {
    pub id: String,
    #[serde(default)]
    pub subreddit: String,
}
