use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use serde_json::Value;
use url::Url;

use crate::reddit::{RedditClient, Transport};

pub const MOCK_BASE_URL: &str = "http://mock.test/";

/// In-memory transport answering canned JSON by request path. Unknown paths
/// fail like an unreachable network.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    routes: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<Url>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, path: &str, body: Value) -> Self {
        self.inner.routes.lock().insert(path.to_string(), body);
        self
    }

    pub fn requests(&self) -> Vec<Url> {
        self.inner.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    pub fn client(&self) -> RedditClient {
        RedditClient::new(Arc::new(self.clone()), Some(MOCK_BASE_URL))
            .expect("mock base url parses")
    }
}

impl Transport for MockTransport {
    fn get_json(&self, url: &Url) -> Result<Value> {
        self.inner.requests.lock().push(url.clone());
        self.inner
            .routes
            .lock()
            .get(url.path())
            .cloned()
            .ok_or_else(|| anyhow!("mock: no route for {}", url.path()))
    }
}
