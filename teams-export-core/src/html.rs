//! HTML-to-text normalization for rich message bodies.

use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</div\s*>").expect("hardcoded regex"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("hardcoded regex"));

/// `&amp;` must stay last so escaped entities decode only once.
const ENTITIES: [(&str, &str); 5] = [
    ("&nbsp;", " "),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&amp;", "&"),
];

/// Convert an HTML message body to plain text.
///
/// Line breaks and closing paragraph/div tags become newlines, every other
/// tag is dropped, and the common entities are decoded.
pub fn html_to_text(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let text = LINE_BREAK.replace_all(html, "\n");
    let mut text = TAG.replace_all(&text, "").into_owned();
    for (entity, replacement) in ENTITIES {
        text = text.replace(entity, replacement);
    }
    text.trim().to_string()
}
