use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, error, warn};

use crate::cache::{self, Cache};
use crate::config::{EmbedMode, WidgetOptions};
use crate::extract;
use crate::fetcher::fetch_comments;
use crate::interact::{self, CommentView};
use crate::reddit::{HttpTransport, RedditClient, Transport, TransportConfig};
use crate::render;
use crate::resolver::resolve_submission_id;

/// Host element whose contents the widget replaces.
pub trait Frame {
    fn replace_contents(&mut self, html: &str);
}

impl Frame for String {
    fn replace_contents(&mut self, html: &str) {
        self.clear();
        self.push_str(html);
    }
}

impl<F: Frame + ?Sized> Frame for &mut F {
    fn replace_contents(&mut self, html: &str) {
        (**self).replace_contents(html);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Resolving,
    Fetching,
    Rendered,
}

/// One comment section on one page. Renders at most once.
pub struct Widget<F: Frame> {
    frame: F,
    options: WidgetOptions,
    page_url: String,
    cache: Cache,
    client: RedditClient,
    state: State,
    view: Option<CommentView>,
}

/// Constructs and initializes a widget. Configuration errors are logged
/// and yield `None`; nothing is written to the frame in that case.
pub fn init<F: Frame>(frame: F, options: WidgetOptions) -> Option<Widget<F>> {
    match Widget::new(frame, options) {
        Ok(mut widget) => {
            widget.init();
            Some(widget)
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "widget: construction failed");
            None
        }
    }
}

impl<F: Frame> Widget<F> {
    pub fn new(frame: F, options: WidgetOptions) -> Result<Self> {
        options.validate()?;
        let cache = match options.cache_path.clone().or_else(cache::default_path) {
            Some(path) => Cache::open(&path)?,
            None => Cache::in_memory()?,
        };
        let transport = HttpTransport::new(TransportConfig {
            user_agent: options.user_agent.clone(),
            http_client: None,
        })
        .context("widget: build http transport")?;
        Self::with_parts(frame, options, cache, Arc::new(transport))
    }

    /// Builds a widget over an existing cache and transport.
    pub fn with_parts(
        frame: F,
        options: WidgetOptions,
        cache: Cache,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        options.validate()?;
        let client = RedditClient::new(transport, Some(&options.base_url))?;
        let page_url = options.url.clone().unwrap_or_default();
        Ok(Self {
            frame,
            options,
            page_url,
            cache,
            client,
            state: State::Created,
            view: None,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn view(&self) -> Option<&CommentView> {
        self.view.as_ref()
    }

    pub fn frame(&self) -> &F {
        &self.frame
    }

    /// Resolves, fetches, renders, and wires the comment section. Failures
    /// along the way leave an empty section instead of an error.
    pub fn init(&mut self) -> State {
        if self.state != State::Created {
            return self.state;
        }

        self.state = State::Resolving;
        let subreddit = self.options.subreddit.clone();
        let submission_id =
            match resolve_submission_id(&self.cache, &self.client, &self.page_url, &subreddit) {
                Ok(Some(id)) => id,
                Ok(None) => {
                    debug!(page_url = %self.page_url, "widget: nothing to show");
                    self.mount("");
                    return self.state;
                }
                Err(err) => {
                    warn!(page_url = %self.page_url, error = %format!("{err:#}"), "widget: resolve failed");
                    self.mount("");
                    return self.state;
                }
            };

        self.state = State::Fetching;
        let raw = fetch_comments(
            &self.cache,
            &self.client,
            &subreddit,
            &submission_id,
            self.options.sort,
            self.options.comments_cache_expiration,
        )
        .unwrap_or_else(|err| {
            warn!(submission_id = %submission_id, error = %format!("{err:#}"), "widget: fetch failed");
            Vec::new()
        });

        let comments = extract::extract(&raw);
        let view = interact::wire(comments, self.client.base_url().clone());
        let html = view.html();
        self.view = Some(view);
        self.mount(&html);
        self.state = State::Rendered;
        self.state
    }

    /// Click on collapse control `index`; re-renders when it exists.
    pub fn click(&mut self, index: usize) -> bool {
        let Some(view) = self.view.as_mut() else {
            return false;
        };
        if !view.click(index) {
            return false;
        }
        let html = view.html();
        self.mount(&html);
        true
    }

    fn mount(&mut self, comments_html: &str) {
        match self.options.embed {
            EmbedMode::Inline => self.frame.replace_contents(comments_html),
            EmbedMode::Iframe => {
                let document = render::render_document(comments_html, &self.options.css_href);
                self.frame.replace_contents(&document);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn options() -> WidgetOptions {
        let mut options = WidgetOptions::for_subreddit("test").with_url("https://blog.test/post");
        options.base_url = crate::testing::MOCK_BASE_URL.into();
        options
    }

    fn info(subreddit: &str) -> serde_json::Value {
        json!({"data": {"children": [{"data": {"id": "abc123", "subreddit": subreddit}}]}})
    }

    #[test]
    fn string_frame_is_replaced() {
        let mut frame = String::from("old");
        frame.replace_contents("new");
        assert_eq!(frame, "new");
    }

    #[test]
    fn init_without_subreddit_creates_nothing() {
        let mut frame = String::from("host content");
        let widget = init(&mut frame, WidgetOptions::default().with_url("https://blog.test/"));
        assert!(widget.is_none());
        drop(widget);
        assert_eq!(frame, "host content");
    }

    #[test]
    fn mismatch_stops_at_resolving_with_empty_render() {
        let transport = MockTransport::new().respond("/api/info.json", info("other"));
        let mut frame = String::from("placeholder");
        let mut widget = Widget::with_parts(
            &mut frame,
            options(),
            Cache::in_memory().unwrap(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        assert_eq!(widget.state(), State::Created);
        assert_eq!(widget.init(), State::Resolving);
        assert!(widget.view().is_none());
        assert_eq!(transport.request_count(), 1);
        drop(widget);
        assert_eq!(frame, "");
    }

    #[test]
    fn failed_fetch_still_renders_empty() {
        let transport = MockTransport::new().respond("/api/info.json", info("test"));
        let mut widget = Widget::with_parts(
            String::new(),
            options(),
            Cache::in_memory().unwrap(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        assert_eq!(widget.init(), State::Rendered);
        assert_eq!(widget.view().map(|v| v.controls().len()), Some(0));
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn renders_once() {
        let transport = MockTransport::new().respond("/api/info.json", info("test"));
        let mut widget = Widget::with_parts(
            String::new(),
            options(),
            Cache::in_memory().unwrap(),
            Arc::new(transport.clone()),
        )
        .unwrap();
        widget.init();
        assert_eq!(widget.init(), State::Rendered);
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn iframe_mode_wraps_document() {
        let transport = MockTransport::new().respond("/api/info.json", info("other"));
        let mut options = options();
        options.embed = EmbedMode::Iframe;
        options.css_href = "/static/rc.css".into();
        let mut widget = Widget::with_parts(
            String::new(),
            options,
            Cache::in_memory().unwrap(),
            Arc::new(transport),
        )
        .unwrap();
        widget.init();
        assert!(widget.frame().starts_with("<!doctype html>"));
        assert!(widget.frame().contains("href=\"/static/rc.css\""));
    }
}
