use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::cache::{resolution_key, Cache};
use crate::reddit::{CommentSort, RedditClient};

/// Raw comment records for a submission, cached for `ttl_minutes`.
///
/// A response without the expected listing element yields no comments.
pub fn fetch_comments(
    cache: &Cache,
    client: &RedditClient,
    subreddit: &str,
    submission_id: &str,
    sort: Option<CommentSort>,
    ttl_minutes: u32,
) -> Result<Vec<Value>> {
    let url = client.comments_url(subreddit, submission_id, sort)?;
    let key = resolution_key(url.as_str());
    if let Some(Value::Array(records)) = cache.get(&key) {
        debug!(submission_id, count = records.len(), "fetch: cache hit");
        return Ok(records);
    }

    let records = client.comment_listing(subreddit, submission_id, sort)?;
    debug!(submission_id, count = records.len(), "fetch: listing received");
    cache.set(&key, &Value::Array(records.clone()), ttl_minutes);
    Ok(records)
}
