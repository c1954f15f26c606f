//! Test doubles shared by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use serde_json::{Value, json};

use crate::auth::TokenProvider;
use crate::error::{Error, Result};
use crate::fetch::{Page, PageResponse, PageSource};

/// Page source answering from per-URL queues of scripted responses.
///
/// Unscripted requests fail with status 500.
#[derive(Default)]
pub(crate) struct ScriptedSource {
    routes: RefCell<HashMap<String, VecDeque<Result<PageResponse>>>>,
    requests: RefCell<Vec<String>>,
    tokens: RefCell<Vec<String>>,
    times: RefCell<Vec<Instant>>,
}

impl ScriptedSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next request to `url`.
    pub(crate) fn respond(&self, url: &str, response: Result<PageResponse>) {
        self.routes
            .borrow_mut()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    pub(crate) fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }

    pub(crate) fn tokens(&self) -> Vec<String> {
        self.tokens.borrow().clone()
    }

    /// When each request arrived, in order.
    pub(crate) fn request_times(&self) -> Vec<Instant> {
        self.times.borrow().clone()
    }
}

impl PageSource for ScriptedSource {
    fn get_page(&self, url: &str, token: &str) -> Result<PageResponse> {
        self.requests.borrow_mut().push(url.to_string());
        self.tokens.borrow_mut().push(token.to_string());
        self.times.borrow_mut().push(Instant::now());
        self.routes
            .borrow_mut()
            .get_mut(url)
            .and_then(|queue| queue.pop_front())
            .unwrap_or_else(|| {
                Ok(PageResponse::Failed {
                    status: 500,
                    detail: format!("unscripted request: {url}"),
                })
            })
    }
}

/// A successful page of `{"id": ...}` records.
pub(crate) fn page(ids: &[&str], next: Option<&str>) -> Result<PageResponse> {
    page_of(ids.iter().map(|id| json!({ "id": id })).collect(), next)
}

/// A successful page of arbitrary records.
pub(crate) fn page_of(items: Vec<Value>, next: Option<&str>) -> Result<PageResponse> {
    Ok(PageResponse::Page(Page {
        items,
        next_link: next.map(str::to_string),
    }))
}

/// A raw Graph channel message record.
pub(crate) fn message_record(
    id: &str,
    reply_to: Option<&str>,
    created: &str,
    author: &str,
    content: &str,
) -> Value {
    json!({
        "id": id,
        "replyToId": reply_to,
        "createdDateTime": created,
        "from": {"user": {"displayName": author}},
        "subject": null,
        "body": {"contentType": "text", "content": content}
    })
}

/// Token provider that always fails.
pub(crate) struct FailingToken;

impl TokenProvider for FailingToken {
    fn access_token(&self) -> Result<String> {
        Err(Error::Auth("invalid_client".to_string()))
    }
}
