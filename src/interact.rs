use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use crate::extract::{Comment, MAX_DEPTH};
use crate::render::{self, Collapsed};

static RELATIVE_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href="/((?:r|u|user)/[^"]*)""#).expect("relative link pattern")
});

/// One collapse button in the rendered tree, in pre-order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollapseControl {
    pub index: usize,
    pub author: String,
}

/// A rendered comment tree with live collapse state.
#[derive(Debug, Clone)]
pub struct CommentView {
    comments: Vec<Comment>,
    collapsed: Collapsed,
    link_base: Url,
    controls: Vec<CollapseControl>,
}

/// Binds one collapse control per comment and fixes up links against `base`.
pub fn wire(comments: Vec<Comment>, base: Url) -> CommentView {
    let mut controls = Vec::new();
    collect_controls(&comments, &mut controls);
    CommentView {
        comments,
        collapsed: Collapsed::new(),
        link_base: base,
        controls,
    }
}

// Same traversal as the renderer: pre-order, skipping depth MAX_DEPTH and deeper.
fn collect_controls(comments: &[Comment], out: &mut Vec<CollapseControl>) {
    let mut stack: Vec<(&Comment, usize)> = comments.iter().rev().map(|c| (c, 0)).collect();
    while let Some((comment, depth)) = stack.pop() {
        if depth >= MAX_DEPTH {
            continue;
        }
        out.push(CollapseControl {
            index: out.len(),
            author: comment.author.clone(),
        });
        stack.extend(comment.replies.iter().rev().map(|c| (c, depth + 1)));
    }
}

impl CommentView {
    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn controls(&self) -> &[CollapseControl] {
        &self.controls
    }

    pub fn is_collapsed(&self, index: usize) -> bool {
        self.collapsed.contains(&index)
    }

    /// Toggles the comment behind control `index`. Returns false for an
    /// index with no control.
    pub fn click(&mut self, index: usize) -> bool {
        if index >= self.controls.len() {
            return false;
        }
        if !self.collapsed.remove(&index) {
            self.collapsed.insert(index);
        }
        true
    }

    pub fn html(&self) -> String {
        let markup = render::render_with(&self.comments, &self.collapsed);
        absolutize_links(&markup, &self.link_base)
    }
}

/// Rewrites root-relative subreddit and user links to point at `base`.
pub fn absolutize_links(markup: &str, base: &Url) -> String {
    RELATIVE_LINK
        .replace_all(markup, |caps: &Captures<'_>| match base.join(&caps[1]) {
            Ok(url) => format!("href=\"{url}\""),
            Err(_) => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn comment(author: &str, body: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            author: author.into(),
            created_at: Utc.timestamp_opt(0, 0).single().unwrap(),
            created_vague: "a while ago".into(),
            score: 1,
            body: body.into(),
            replies,
        }
    }

    fn base() -> Url {
        Url::parse("https://www.reddit.com/").unwrap()
    }

    #[test]
    fn rewrites_subreddit_and_user_links_only() {
        let markup = r#"<a href="/r/rust">r</a> <a href="/u/alice">u</a> <a href="/user/bob">b</a> <a href="/wiki/x">w</a> <a href="https://x.test/r/y">abs</a>"#;
        let out = absolutize_links(markup, &base());
        assert!(out.contains(r#"href="https://www.reddit.com/r/rust""#));
        assert!(out.contains(r#"href="https://www.reddit.com/u/alice""#));
        assert!(out.contains(r#"href="https://www.reddit.com/user/bob""#));
        assert!(out.contains(r#"href="/wiki/x""#));
        assert!(out.contains(r#"href="https://x.test/r/y""#));
    }

    #[test]
    fn one_control_per_comment_in_preorder() {
        let view = wire(
            vec![
                comment("a", "", vec![comment("b", "", vec![]), comment("c", "", vec![])]),
                comment("d", "", vec![]),
            ],
            base(),
        );
        let authors: Vec<_> = view.controls().iter().map(|c| c.author.as_str()).collect();
        assert_eq!(authors, vec!["a", "b", "c", "d"]);
        assert_eq!(view.controls()[3].index, 3);
    }

    #[test]
    fn click_toggles_collapse_state() {
        let mut view = wire(vec![comment("a", "<p>x</p>", vec![comment("b", "", vec![])])], base());
        assert!(!view.html().contains("rc-collapsed"));

        assert!(view.click(0));
        assert!(view.is_collapsed(0));
        let html = view.html();
        assert!(html.contains("rc-collapsed"));
        assert!(html.contains("<div class=\"rc-replies\" style=\"display:none\">"));

        assert!(view.click(0));
        assert!(!view.is_collapsed(0));
        assert!(!view.html().contains("display:none"));

        assert!(!view.click(7));
    }

    #[test]
    fn controls_stop_where_rendering_stops() {
        let mut node = comment("leaf", "", vec![]);
        for _ in 0..(MAX_DEPTH + 5) {
            node = comment("n", "", vec![node]);
        }
        let mut view = wire(vec![node], base());
        assert_eq!(view.controls().len(), MAX_DEPTH);
        assert_eq!(view.html().matches("class=\"reddit-comment\"").count(), MAX_DEPTH);
        assert!(view.click(MAX_DEPTH - 1));
        assert!(!view.click(MAX_DEPTH));
    }

    #[test]
    fn html_absolutizes_body_links() {
        let view = wire(vec![comment("a", r#"<p><a href="/r/test">r/test</a></p>"#, vec![])], base());
        assert!(view.html().contains(r#"<a href="https://www.reddit.com/r/test">"#));
    }
}
