use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{resolution_key, Cache};
use crate::config::SUBMISSION_CACHE_EXPIRATION;
use crate::reddit::{same_subreddit, RedditClient};

/// Reddit's base-36 identifier of a submission.
pub type SubmissionId = String;

/// What a page URL resolved to. The subreddit is kept so a hit can be
/// rechecked against the caller's subreddit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedSubmission {
    id: SubmissionId,
    subreddit: String,
}

/// Finds the submission in `subreddit` that links to `page_url`.
///
/// Cache hits return without touching the network. An empty lookup or a
/// submission from another subreddit resolve to `None`; only transport
/// failures are errors.
pub fn resolve_submission_id(
    cache: &Cache,
    client: &RedditClient,
    page_url: &str,
    subreddit: &str,
) -> Result<Option<SubmissionId>> {
    let key = resolution_key(page_url);
    let cached = cache
        .get(&key)
        .and_then(|value| serde_json::from_value::<CachedSubmission>(value).ok());
    match cached {
        Some(hit) if same_subreddit(&hit.subreddit, subreddit) => {
            debug!(page_url, id = %hit.id, "resolve: cache hit");
            return Ok(Some(hit.id));
        }
        Some(hit) => {
            debug!(page_url, cached = %hit.subreddit, subreddit, "resolve: cached for another subreddit");
        }
        None => {}
    }

    let Some(item) = client.lookup_info(page_url)? else {
        debug!(page_url, "resolve: no submission found");
        return Ok(None);
    };

    if !same_subreddit(&item.subreddit, subreddit) {
        warn!(
            page_url,
            expected = subreddit,
            found = %item.subreddit,
            "resolve: submission belongs to another subreddit"
        );
        return Ok(None);
    }

    let entry = CachedSubmission {
        id: item.id,
        subreddit: item.subreddit,
    };
    match serde_json::to_value(&entry) {
        Ok(value) => cache.set(&key, &value, SUBMISSION_CACHE_EXPIRATION),
        Err(err) => warn!(page_url, error = %err, "resolve: cache entry not encodable"),
    }
    Ok(Some(entry.id))
}
