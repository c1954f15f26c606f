//! Paginated retrieval of Graph collections.
//!
//! [`fetch_collection`] follows `@odata.nextLink` cursors through a
//! [`PageSource`], waiting out rate limits and pacing successive pages.
//! [`GraphClient`] is the HTTP-backed source and [`GraphEndpoints`] builds
//! the collection URLs it is pointed at.

use std::thread;
use std::time::Duration;

use log::{Level, debug, log, warn};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde_json::Value;

use crate::error::{Error, Result};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of characters of an error body kept in error messages.
const ERROR_SNIPPET_CHARS: usize = 400;

/// One page of a collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    /// Continuation URL; `None` once the collection is exhausted.
    pub next_link: Option<String>,
}

impl Page {
    /// Read a `{value: [...], "@odata.nextLink": ...}` document.
    pub fn from_json(doc: &Value) -> Self {
        let items = doc
            .get("value")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();
        let next_link = doc
            .get("@odata.nextLink")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        Self { items, next_link }
    }
}

/// Outcome of a single page request.
#[derive(Debug)]
pub enum PageResponse {
    Page(Page),
    /// HTTP 429; the hint is the server's Retry-After, if any.
    RateLimited { retry_after: Option<Duration> },
    /// HTTP 404.
    NotFound,
    /// Any other non-success status.
    Failed { status: u16, detail: String },
}

/// Something that can answer page requests.
///
/// Transport-level failures (connection refused, timeouts, unreadable bodies)
/// are returned as `Err`.
pub trait PageSource {
    fn get_page(&self, url: &str, token: &str) -> Result<PageResponse>;
}

impl<T: PageSource + ?Sized> PageSource for &T {
    fn get_page(&self, url: &str, token: &str) -> Result<PageResponse> {
        (**self).get_page(url, token)
    }
}

/// Limits and pacing for one collection fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Stop once this many items are collected (at least one page is always fetched).
    pub max_items: Option<usize>,
    /// Pause before following a continuation link.
    pub page_delay: Duration,
    /// Wait used when a 429 carries no Retry-After.
    pub default_retry_after: Duration,
    /// Treat 404 as an exhausted collection instead of an error.
    pub not_found_is_empty: bool,
    /// Level for per-page progress logging.
    pub progress_level: Level,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_items: None,
            page_delay: Duration::from_millis(500),
            default_retry_after: Duration::from_secs(60),
            not_found_is_empty: false,
            progress_level: Level::Info,
        }
    }
}

/// Items collected by [`fetch_collection`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    pub items: Vec<Value>,
    /// Successful pages traversed; rate-limited attempts are not counted.
    pub pages: usize,
}

/// Retrieve every item of a paginated collection starting at `url`.
///
/// Any failure aborts the whole fetch; no partial result is returned. The
/// error carries the number of pages and items retrieved before it happened.
pub fn fetch_collection<S: PageSource + ?Sized>(
    source: &S,
    url: &str,
    token: &str,
    options: &FetchOptions,
) -> Result<FetchOutcome> {
    let mut items: Vec<Value> = Vec::new();
    let mut pages = 0;
    let mut cursor = Some(url.to_string());

    while let Some(current) = cursor.take() {
        debug!("GET {current}");
        let response = source
            .get_page(&current, token)
            .map_err(|err| Error::Network {
                pages,
                items: items.len(),
                message: err.to_string(),
            })?;

        match response {
            PageResponse::Page(page) => {
                pages += 1;
                let count = page.items.len();
                items.extend(page.items);
                log!(
                    options.progress_level,
                    "page {pages}: {count} item(s) (total: {})",
                    items.len()
                );

                if let Some(max) = options.max_items
                    && items.len() >= max
                {
                    items.truncate(max);
                    log!(options.progress_level, "reached limit of {max} item(s)");
                    break;
                }

                if let Some(next) = page.next_link {
                    if !options.page_delay.is_zero() {
                        thread::sleep(options.page_delay);
                    }
                    cursor = Some(next);
                }
            }
            PageResponse::RateLimited { retry_after } => {
                let wait = retry_after.unwrap_or(options.default_retry_after);
                warn!("rate limited, waiting {}s", wait.as_secs_f32());
                thread::sleep(wait);
                cursor = Some(current);
            }
            PageResponse::NotFound if options.not_found_is_empty => {
                debug!("collection not found, treating as empty: {current}");
            }
            PageResponse::NotFound => {
                return Err(Error::Fetch {
                    status: StatusCode::NOT_FOUND.as_u16(),
                    pages,
                    items: items.len(),
                    detail: "resource not found".to_string(),
                });
            }
            PageResponse::Failed { status, detail } => {
                return Err(Error::Fetch {
                    status,
                    pages,
                    items: items.len(),
                    detail,
                });
            }
        }
    }

    Ok(FetchOutcome { items, pages })
}

/// Collection URLs of one Graph deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoints {
    base_url: String,
    page_size: u32,
}

impl GraphEndpoints {
    pub fn new(base_url: &str, page_size: u32) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size,
        }
    }

    /// First page URL of a channel's messages.
    pub fn messages_url(&self, team_id: &str, channel_id: &str) -> String {
        format!(
            "{}/teams/{}/channels/{}/messages?$top={}",
            self.base_url,
            urlencoding::encode(team_id),
            urlencoding::encode(channel_id),
            self.page_size
        )
    }

    /// First page URL of the replies to one message.
    pub fn replies_url(&self, team_id: &str, channel_id: &str, message_id: &str) -> String {
        format!(
            "{}/teams/{}/channels/{}/messages/{}/replies?$top={}",
            self.base_url,
            urlencoding::encode(team_id),
            urlencoding::encode(channel_id),
            urlencoding::encode(message_id),
            self.page_size
        )
    }
}

/// Blocking Microsoft Graph client.
#[derive(Debug, Clone)]
pub struct GraphClient {
    http: Client,
}

impl GraphClient {
    /// Create a new Graph client.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let timeout = timeout.unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    fn handle_response(&self, resp: Response) -> Result<PageResponse> {
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Ok(PageResponse::RateLimited { retry_after });
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(PageResponse::NotFound);
        }

        let text = resp.text()?;
        if !status.is_success() {
            return Ok(PageResponse::Failed {
                status: status.as_u16(),
                detail: error_detail(&text),
            });
        }

        let doc: Value = serde_json::from_str(&text)
            .map_err(|e| Error::Transport(format!("invalid page body: {e}")))?;
        Ok(PageResponse::Page(Page::from_json(&doc)))
    }
}

impl PageSource for GraphClient {
    fn get_page(&self, url: &str, token: &str) -> Result<PageResponse> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .send()?;
        self.handle_response(resp)
    }
}

/// Pull the Graph error message out of a failure body, or keep a snippet of it.
fn error_detail(text: &str) -> String {
    if let Ok(val) = serde_json::from_str::<Value>(text)
        && let Some(message) = val
            .get("error")
            .and_then(|e| e.get("message"))
            .and_then(|m| m.as_str())
    {
        return message.to_string();
    }
    text.chars().take(ERROR_SNIPPET_CHARS).collect()
}
