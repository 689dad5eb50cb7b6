use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::SecondsFormat;
use html_escape::encode_double_quoted_attribute as escape;

use crate::extract::{Comment, MAX_DEPTH};

const HIDDEN: &str = r#" style="display:none""#;

/// Pre-order indices of comments whose bodies and replies are folded away.
pub type Collapsed = HashSet<usize>;

pub fn render(comments: &[Comment]) -> String {
    render_with(comments, &Collapsed::new())
}

pub fn render_with(comments: &[Comment], collapsed: &Collapsed) -> String {
    let mut next_index = 0;
    render_level(comments, collapsed, &mut next_index, 0)
}

fn render_level(
    comments: &[Comment],
    collapsed: &Collapsed,
    next_index: &mut usize,
    depth: usize,
) -> String {
    if depth >= MAX_DEPTH {
        return String::new();
    }
    let mut out = String::new();
    for comment in comments {
        let index = *next_index;
        *next_index += 1;
        let replies = render_level(&comment.replies, collapsed, next_index, depth + 1);
        out.push_str(&render_comment(comment, &replies, collapsed.contains(&index)));
    }
    out
}

fn render_comment(comment: &Comment, replies: &str, collapsed: bool) -> String {
    let hidden = if collapsed { HIDDEN } else { "" };
    let control = if collapsed {
        "rc-collapse rc-collapsed rc-icon-plus"
    } else {
        "rc-collapse rc-icon-horiz"
    };
    let created = comment
        .created_at
        .to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut out = String::new();
    out.push_str("<div class=\"reddit-comment\">\n");
    let _ = writeln!(
        out,
        "    <div class=\"rc-vote\"{hidden}>\n        <button class=\"rc-arrow rc-arrow-up\"></button>\n        <button class=\"rc-arrow rc-arrow-down\"></button>\n    </div>"
    );
    let _ = writeln!(out, "    <button class=\"{control}\"></button>");
    let _ = writeln!(
        out,
        "    <div class=\"rc-header\">\n        <span class=\"rc-author\">{}</span> &bull;\n        <span class=\"rc-score\">{}</span> points &bull;\n        around <span class=\"rc-created\" title=\"{}\">{}</span>\n    </div>",
        escape(&comment.author),
        escape(&comment.score.to_string()),
        escape(&created),
        escape(&comment.created_vague),
    );
    let _ = writeln!(out, "    <div class=\"rc-comment\"{hidden}>{}</div>", comment.body);
    if !replies.is_empty() {
        let _ = writeln!(out, "    <div class=\"rc-replies\"{hidden}>\n{replies}    </div>");
    }
    out.push_str("</div>\n");
    out
}

/// Wraps rendered comments in the standalone document used for iframe
/// embedding.
pub fn render_document(comments_html: &str, css_href: &str) -> String {
    format!(
        "<!doctype html>\n<html>\n  <head>\n    <title>Reddit Comments</title>\n    <link rel=\"stylesheet\" href=\"{}\"/>\n  </head>\n  <body>\n{}  </body>\n</html>\n",
        escape(css_href),
        comments_html,
    )
}
