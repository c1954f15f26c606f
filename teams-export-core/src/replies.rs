//! Per-message reply retrieval.

use std::thread;
use std::time::{Duration, Instant};

use log::{Level, debug, warn};

use crate::fetch::{FetchOptions, PageSource, fetch_collection};
use crate::message::{ChatMessage, sort_chronologically};

/// Fetches the replies of individual messages.
///
/// Failures are isolated: a message whose replies cannot be retrieved is
/// reported as having none, and the caller carries on with the next one.
pub struct ReplyResolver<'a, S: PageSource + ?Sized> {
    source: &'a S,
    token: &'a str,
    options: FetchOptions,
    delay: Duration,
    last_fetch: Option<Instant>,
}

impl<'a, S: PageSource + ?Sized> ReplyResolver<'a, S> {
    /// `options.max_items` caps the replies of each message; `delay` spaces
    /// out fetches for different messages.
    pub fn new(source: &'a S, token: &'a str, options: FetchOptions, delay: Duration) -> Self {
        let options = FetchOptions {
            not_found_is_empty: true,
            progress_level: Level::Debug,
            ..options
        };
        Self {
            source,
            token,
            options,
            delay,
            last_fetch: None,
        }
    }

    /// Replies found at `url` for message `parent_id`, oldest first.
    pub fn resolve(&mut self, parent_id: &str, url: &str) -> Vec<ChatMessage> {
        self.pace();
        let result = fetch_collection(self.source, url, self.token, &self.options);
        self.last_fetch = Some(Instant::now());

        match result {
            Ok(outcome) => {
                let mut replies = ChatMessage::from_values(&outcome.items);
                sort_chronologically(&mut replies);
                debug!("message {parent_id}: {} reply(ies)", replies.len());
                replies
            }
            Err(err) => {
                warn!("failed to fetch replies for message {parent_id}: {err}");
                Vec::new()
            }
        }
    }

    fn pace(&self) {
        if let Some(last) = self.last_fetch {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                thread::sleep(self.delay - elapsed);
            }
        }
    }
}
