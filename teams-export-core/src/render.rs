//! Markdown rendering of messages and threads.
//!
//! Rendering never fails: missing fields are shown as sentinels and
//! unparsable timestamps are printed as received.

use crate::html::html_to_text;
use crate::message::{ChatMessage, ContentType, parse_timestamp};
use crate::thread::ThreadTree;

/// Shown for a message without a creation timestamp.
pub const UNKNOWN_TIME: &str = "Unknown time";
/// Heading of a thread document whose root has no subject.
pub const NO_SUBJECT: &str = "(No Subject)";

const INDENT: &str = "  ";

/// Timestamp precision used in attribution lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampStyle {
    /// `YYYY-MM-DD HH:MM`
    Minutes,
    /// `YYYY-MM-DD HH:MM:SS UTC`
    Seconds,
}

/// Format an ISO-8601 timestamp in UTC, independent of the local locale.
pub fn format_timestamp(raw: &str, style: TimestampStyle) -> String {
    if raw.is_empty() {
        return UNKNOWN_TIME.to_string();
    }
    let Some(utc) = parse_timestamp(raw) else {
        return raw.to_string();
    };
    match style {
        TimestampStyle::Minutes => utc.format("%Y-%m-%d %H:%M").to_string(),
        TimestampStyle::Seconds => utc.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    }
}

/// Non-blank body lines, with HTML bodies converted to text first.
pub fn body_lines(msg: &ChatMessage) -> Vec<String> {
    let text = match msg.body.content_type {
        ContentType::Html => html_to_text(&msg.body.content),
        ContentType::Text => msg.body.content.clone(),
    };
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn attribution(msg: &ChatMessage, style: TimestampStyle) -> String {
    format!(
        "**{}** • {}",
        msg.author,
        format_timestamp(&msg.created, style)
    )
}

/// Lines for one message at `depth`; the subject heading only appears at depth 0.
pub fn render_message(msg: &ChatMessage, depth: usize) -> Vec<String> {
    let indent = INDENT.repeat(depth);
    let mut lines = Vec::new();

    if depth == 0
        && let Some(subject) = &msg.subject
    {
        lines.push(format!("{indent}### {subject}"));
        lines.push(String::new());
    }

    lines.push(format!(
        "{indent}{}",
        attribution(msg, TimestampStyle::Minutes)
    ));
    lines.push(String::new());

    let body = body_lines(msg);
    if !body.is_empty() {
        lines.extend(body.into_iter().map(|line| format!("{indent}{line}")));
        lines.push(String::new());
    }

    lines
}

/// Lines for `root` and all of its descendants, indented by depth.
pub fn render_tree(root: &ChatMessage, tree: &ThreadTree) -> Vec<String> {
    let mut lines = Vec::new();
    let mut path = Vec::new();
    render_subtree(root, tree, 0, &mut path, &mut lines);
    lines
}

fn render_subtree<'a>(
    msg: &'a ChatMessage,
    tree: &'a ThreadTree,
    depth: usize,
    path: &mut Vec<&'a str>,
    lines: &mut Vec<String>,
) {
    // Duplicate ids could otherwise loop forever.
    if path.contains(&msg.id.as_str()) {
        return;
    }
    lines.extend(render_message(msg, depth));

    path.push(&msg.id);
    for child in tree.children_of(&msg.id) {
        render_subtree(child, tree, depth + 1, path, lines);
    }
    path.pop();
}

/// Standalone document for one root message and its (flat) replies.
pub fn render_thread_document(root: &ChatMessage, replies: &[ChatMessage]) -> String {
    let mut lines = vec![
        format!("# {}", root.subject.as_deref().unwrap_or(NO_SUBJECT)),
        String::new(),
        attribution(root, TimestampStyle::Seconds),
        String::new(),
    ];
    let body = body_lines(root);
    if !body.is_empty() {
        lines.extend(body);
        lines.push(String::new());
    }

    if !replies.is_empty() {
        lines.push("---".to_string());
        lines.push(String::new());
        lines.push(format!("## Replies ({})", replies.len()));
        lines.push(String::new());

        for (i, reply) in replies.iter().enumerate() {
            lines.push(format!("### Reply {}", i + 1));
            lines.push(String::new());
            lines.push(attribution(reply, TimestampStyle::Seconds));
            lines.push(String::new());
            let body = body_lines(reply);
            if !body.is_empty() {
                lines.extend(body);
                lines.push(String::new());
            }
        }
    }

    lines.join("\n")
}

/// Header values of a whole-channel document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    pub exported_at: String,
    pub message_count: usize,
}

/// Whole-channel document: every root thread, newest first, with nested replies.
pub fn render_channel_document(tree: &ThreadTree, summary: &ChannelSummary) -> String {
    let mut roots: Vec<&ChatMessage> = tree.roots().iter().collect();
    roots.sort_by(|a, b| b.cmp_created(a));

    let mut lines = vec![
        "# Teams Channel Discussions".to_string(),
        String::new(),
        format!("**Exported**: {}", summary.exported_at),
        format!("**Total Messages**: {}", summary.message_count),
        String::new(),
        "---".to_string(),
        String::new(),
    ];

    for (i, root) in roots.into_iter().enumerate() {
        lines.push(format!("## Thread {}", i + 1));
        lines.push(String::new());
        lines.extend(render_tree(root, tree));
        lines.push("---".to_string());
        lines.push(String::new());
    }

    lines.join("\n")
}
