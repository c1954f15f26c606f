//! Channel message model decoded from raw Graph records.
//!
//! Records are decoded leniently: a missing or mistyped field falls back to a
//! sentinel instead of failing, so a single malformed record never aborts an
//! export.

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Author shown when a record has no `from` information.
pub const UNKNOWN_AUTHOR: &str = "Unknown";
/// Author shown for messages posted by the service itself.
pub const SYSTEM_AUTHOR: &str = "System";
/// Identifier used when a record carries no `id`.
pub const UNKNOWN_ID: &str = "unknown";

/// Body content type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Text,
    Html,
}

impl ContentType {
    fn from_tag(tag: &str) -> Self {
        if tag.eq_ignore_ascii_case("html") {
            ContentType::Html
        } else {
            ContentType::Text
        }
    }
}

/// Message body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub content_type: ContentType,
    pub content: String,
}

/// A single channel message or reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    /// Parent message id; `None` for root messages.
    pub reply_to_id: Option<String>,
    /// Creation timestamp as sent by the server (ISO-8601).
    pub created: String,
    pub author: String,
    pub subject: Option<String>,
    pub body: MessageBody,
}

impl ChatMessage {
    /// Decode a raw record, degrading every unreadable field to its sentinel.
    pub fn from_value(value: &Value) -> Self {
        let str_field = |key: &str| {
            value
                .get(key)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let body = value.get("body");
        let content_type = body
            .and_then(|b| b.get("contentType"))
            .and_then(|v| v.as_str())
            .map(ContentType::from_tag)
            .unwrap_or_default();
        let content = body
            .and_then(|b| b.get("content"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        Self {
            id: str_field("id").unwrap_or_else(|| UNKNOWN_ID.to_string()),
            reply_to_id: str_field("replyToId"),
            created: str_field("createdDateTime").unwrap_or_default(),
            author: author_name(value.get("from")),
            subject: str_field("subject"),
            body: MessageBody {
                content_type,
                content,
            },
        }
    }

    /// Decode a list of raw records.
    pub fn from_values(values: &[Value]) -> Vec<Self> {
        values.iter().map(Self::from_value).collect()
    }

    pub fn is_root(&self) -> bool {
        self.reply_to_id.is_none()
    }

    /// Parsed creation time, if the timestamp is valid ISO-8601.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.created)
    }

    /// Chronological ordering; unparsable timestamps sort first, by raw text.
    pub fn cmp_created(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }

    fn sort_key(&self) -> SortKey<'_> {
        match self.created_at() {
            Some(at) => SortKey::Parsed(at),
            None => SortKey::Raw(&self.created),
        }
    }
}

/// Parse an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Raw(&'a str),
    Parsed(DateTime<Utc>),
}

/// Sort messages by ascending creation time, keeping input order on ties.
pub fn sort_chronologically(messages: &mut [ChatMessage]) {
    messages.sort_by(|a, b| a.cmp_created(b));
}

fn author_name(from: Option<&Value>) -> String {
    let Some(from) = from.filter(|v| v.is_object()) else {
        return UNKNOWN_AUTHOR.to_string();
    };
    match from.get("user").filter(|u| u.is_object()) {
        Some(user) => user
            .get("displayName")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_AUTHOR)
            .to_string(),
        None => SYSTEM_AUTHOR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_full_record() {
        let msg = ChatMessage::from_value(&json!({
            "id": "1",
            "replyToId": null,
            "createdDateTime": "2024-01-01T10:00:00Z",
            "from": {"user": {"displayName": "Ann"}},
            "subject": "Hi",
            "body": {"contentType": "text", "content": "Hello"}
        }));
        assert_eq!(msg.id, "1");
        assert!(msg.is_root());
        assert_eq!(msg.author, "Ann");
        assert_eq!(msg.subject.as_deref(), Some("Hi"));
        assert_eq!(msg.body.content_type, ContentType::Text);
        assert_eq!(msg.body.content, "Hello");
    }

    #[test]
    fn test_decode_reply_with_html_body() {
        let msg = ChatMessage::from_value(&json!({
            "id": "2",
            "replyToId": "1",
            "createdDateTime": "2024-01-01T11:00:00Z",
            "from": {"user": {"displayName": "Bo"}},
            "body": {"contentType": "html", "content": "<p>Hey</p>"}
        }));
        assert_eq!(msg.reply_to_id.as_deref(), Some("1"));
        assert!(!msg.is_root());
        assert!(msg.subject.is_none());
        assert_eq!(msg.body.content_type, ContentType::Html);
    }

    #[test]
    fn test_author_sentinels() {
        let no_from = ChatMessage::from_value(&json!({"id": "a"}));
        assert_eq!(no_from.author, UNKNOWN_AUTHOR);

        let null_from = ChatMessage::from_value(&json!({"id": "b", "from": null}));
        assert_eq!(null_from.author, UNKNOWN_AUTHOR);

        let system = ChatMessage::from_value(&json!({
            "id": "c",
            "from": {"user": null, "application": {"displayName": "Bot"}}
        }));
        assert_eq!(system.author, SYSTEM_AUTHOR);

        let nameless = ChatMessage::from_value(&json!({"id": "d", "from": {"user": {}}}));
        assert_eq!(nameless.author, UNKNOWN_AUTHOR);
    }

    #[test]
    fn test_malformed_record_degrades() {
        let msg = ChatMessage::from_value(&json!({
            "id": 42,
            "replyToId": "",
            "createdDateTime": 17,
            "subject": "",
            "body": "not an object"
        }));
        assert_eq!(msg.id, UNKNOWN_ID);
        assert!(msg.is_root());
        assert!(msg.created.is_empty());
        assert!(msg.subject.is_none());
        assert_eq!(msg.body, MessageBody::default());
        assert!(msg.created_at().is_none());
    }

    #[test]
    fn test_sort_chronologically_is_stable() {
        let mut messages = ChatMessage::from_values(&[
            json!({"id": "late", "createdDateTime": "2024-01-01T12:00:00Z"}),
            json!({"id": "tie-a", "createdDateTime": "2024-01-01T11:00:00Z"}),
            json!({"id": "early", "createdDateTime": "2024-01-01T09:00:00+00:00"}),
            json!({"id": "tie-b", "createdDateTime": "2024-01-01T11:00:00.000Z"}),
        ]);
        sort_chronologically(&mut messages);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_offsets_compare_by_instant() {
        let earlier = ChatMessage::from_value(
            &json!({"id": "x", "createdDateTime": "2024-01-01T12:00:00+02:00"}),
        );
        let later =
            ChatMessage::from_value(&json!({"id": "y", "createdDateTime": "2024-01-01T11:00:00Z"}));
        assert_eq!(earlier.cmp_created(&later), Ordering::Less);
    }

    #[test]
    fn test_timestamps_without_offset_are_utc() {
        let naive = parse_timestamp("2024-01-01T10:00:00").unwrap();
        assert_eq!(naive, parse_timestamp("2024-01-01T10:00:00Z").unwrap());
        assert_eq!(
            parse_timestamp("2024-01-01").unwrap(),
            parse_timestamp("2024-01-01T00:00:00Z").unwrap()
        );
        assert!(parse_timestamp("yesterday").is_none());

        let mut messages = ChatMessage::from_values(&[
            json!({"id": "late", "createdDateTime": "2024-01-01T12:00:00Z"}),
            json!({"id": "naive", "createdDateTime": "2024-01-01T11:00:00"}),
            json!({"id": "early", "createdDateTime": "2024-01-01T09:00:00Z"}),
        ]);
        sort_chronologically(&mut messages);
        let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "naive", "late"]);
    }
}
