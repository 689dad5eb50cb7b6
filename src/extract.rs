use chrono::{DateTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

/// Deepest nesting level that is extracted or rendered. Reply chains in the
/// source data are unbounded.
pub const MAX_DEPTH: usize = 64;

const COMMENT_KIND: &str = "t1";

static MD_WRAPPER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)\A\s*<div class="md">(.*)</div>\s*\z"#).expect("md wrapper pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub created_vague: String,
    pub score: i64,
    /// Sanitized rich text; rendered without escaping.
    pub body: String,
    pub replies: Vec<Comment>,
}

impl Comment {
    /// Number of nodes in this subtree, the comment itself included.
    pub fn node_count(&self) -> usize {
        1 + self.replies.iter().map(Comment::node_count).sum::<usize>()
    }
}

pub fn extract(raw: &[Value]) -> Vec<Comment> {
    extract_at(raw, Utc::now())
}

/// Builds the comment tree with relative times measured against `now`.
pub fn extract_at(raw: &[Value], now: DateTime<Utc>) -> Vec<Comment> {
    extract_level(raw, now, 0)
}

fn extract_level(raw: &[Value], now: DateTime<Utc>, depth: usize) -> Vec<Comment> {
    if depth >= MAX_DEPTH {
        debug!(depth, dropped = raw.len(), "extract: depth limit reached");
        return Vec::new();
    }
    raw.iter()
        .filter_map(|thing| {
            if thing.get("kind").and_then(Value::as_str) != Some(COMMENT_KIND) {
                return None;
            }
            let data = thing.get("data")?;
            let record = match RawComment::deserialize(data) {
                Ok(record) => record,
                Err(err) => {
                    debug!(depth, error = %err, "extract: unreadable comment record");
                    return None;
                }
            };
            let replies = data
                .get("replies")
                .and_then(reply_children)
                .map(|children| extract_level(children, now, depth + 1))
                .unwrap_or_default();
            Some(record.into_comment(replies, now))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default, deserialize_with = "null_as_default")]
    author: String,
    #[serde(default, deserialize_with = "null_as_default")]
    created_utc: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    ups: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    downs: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    body_html: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl RawComment {
    fn into_comment(self, replies: Vec<Comment>, now: DateTime<Utc>) -> Comment {
        let created_at = Utc
            .timestamp_opt(self.created_utc.trunc() as i64, 0)
            .single()
            .unwrap_or_default();
        Comment {
            author: self.author,
            created_vague: vague_time(created_at, now),
            created_at,
            // The listing's own `score` field has proven unreliable.
            score: self.ups.saturating_sub(self.downs),
            body: clean_body(&self.body_html),
            replies,
        }
    }
}

fn reply_children(replies: &Value) -> Option<&[Value]> {
    replies
        .get("data")?
        .get("children")?
        .as_array()
        .map(Vec::as_slice)
}

/// Strips the `<div class="md">` wrapper the API puts around every body,
/// decoding entities first when the body arrives escaped.
pub fn clean_body(body_html: &str) -> String {
    let decoded = if body_html.trim_start().starts_with("&lt;") {
        html_escape::decode_html_entities(body_html).into_owned()
    } else {
        body_html.to_string()
    };
    match MD_WRAPPER.captures(&decoded) {
        Some(caps) => caps[1].trim().to_string(),
        None => decoded.trim().to_string(),
    }
}

pub fn vague_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - then).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let (value, unit) = match secs {
        s if s < 3_600 => (s / 60, "minute"),
        s if s < 86_400 => (s / 3_600, "hour"),
        s if s < 30 * 86_400 => (s / 86_400, "day"),
        s if s < 365 * 86_400 => (s / (30 * 86_400), "month"),
        s => (s / (365 * 86_400), "year"),
    };
    if value == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{value} {unit}s ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).single().unwrap()
    }

    fn comment(author: &str, replies: Value) -> Value {
        json!({
            "kind": "t1",
            "data": {
                "author": author,
                "created_utc": 1_699_989_200.0,
                "ups": 10,
                "downs": 3,
                "body_html": "&lt;div class=\"md\"&gt;&lt;p&gt;hello &amp;amp; bye&lt;/p&gt;\n&lt;/div&gt;",
                "replies": replies
            }
        })
    }

    #[test]
    fn drops_non_comment_kinds() {
        let raw = vec![
            comment("a", json!("")),
            json!({"kind": "more", "data": {"count": 12, "children": ["x"]}}),
            json!({"kind": "t1"}),
        ];
        let tree = extract_at(&raw, now());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].author, "a");
    }

    #[test]
    fn derives_fields() {
        let tree = extract_at(&[comment("a", Value::Null)], now());
        let c = &tree[0];
        assert_eq!(c.score, 7);
        assert_eq!(c.created_vague, "3 hours ago");
        assert_eq!(c.created_at.timestamp(), 1_699_989_200);
        assert_eq!(c.body, "<p>hello &amp; bye</p>");
        assert!(c.replies.is_empty());
    }

    #[test]
    fn nests_replies_in_order() {
        let replies = json!({
            "kind": "Listing",
            "data": {"children": [
                comment("b", json!("")),
                {"kind": "more", "data": {}},
                comment("c", json!({"kind": "Listing", "data": {"children": [comment("d", json!(""))]}}))
            ]}
        });
        let tree = extract_at(&[comment("a", replies), comment("e", json!(""))], now());
        let authors: Vec<_> = tree.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["a", "e"]);
        let nested: Vec<_> = tree[0].replies.iter().map(|c| c.author.as_str()).collect();
        assert_eq!(nested, vec!["b", "c"]);
        assert_eq!(tree[0].replies[1].replies[0].author, "d");
        assert_eq!(tree[0].node_count(), 4);
    }

    #[test]
    fn extreme_votes_saturate() {
        let raw = vec![json!({"kind": "t1", "data": {"author": "a", "ups": i64::MAX, "downs": -1}})];
        let tree = extract_at(&raw, now());
        assert_eq!(tree[0].score, i64::MAX);
    }

    #[test]
    fn null_fields_keep_comment_and_replies() {
        let raw = vec![json!({
            "kind": "t1",
            "data": {
                "author": null,
                "created_utc": null,
                "ups": null,
                "downs": 2,
                "body_html": null,
                "replies": {"data": {"children": [comment("b", json!(""))]}}
            }
        })];
        let tree = extract_at(&raw, now());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].author, "");
        assert_eq!(tree[0].score, -2);
        assert_eq!(tree[0].body, "");
        assert_eq!(tree[0].replies.len(), 1);
        assert_eq!(tree[0].replies[0].author, "b");
    }

    #[test]
    fn extraction_is_deterministic() {
        let raw = vec![comment("a", json!({"data": {"children": [comment("b", json!(""))]}}))];
        assert_eq!(extract_at(&raw, now()), extract_at(&raw, now()));
    }

    #[test]
    fn depth_is_capped() {
        let mut node = comment("leaf", json!(""));
        for _ in 0..(MAX_DEPTH + 10) {
            node = comment("n", json!({"data": {"children": [node]}}));
        }
        let tree = extract_at(&[node], now());
        assert_eq!(tree[0].node_count(), MAX_DEPTH);
    }

    #[test]
    fn clean_body_variants() {
        assert_eq!(clean_body("<div class=\"md\"><p>hi</p></div>"), "<p>hi</p>");
        assert_eq!(clean_body("<p>plain</p>"), "<p>plain</p>");
        assert_eq!(clean_body(""), "");
    }

    #[test]
    fn vague_time_units() {
        let t = now();
        assert_eq!(vague_time(t, t), "just now");
        assert_eq!(vague_time(t + chrono::Duration::hours(1), t), "just now");
        assert_eq!(vague_time(t - chrono::Duration::minutes(1), t), "1 minute ago");
        assert_eq!(vague_time(t - chrono::Duration::days(2), t), "2 days ago");
        assert_eq!(vague_time(t - chrono::Duration::days(65), t), "2 months ago");
        assert_eq!(vague_time(t - chrono::Duration::days(800), t), "2 years ago");
    }
}
