//! Export orchestration: fetch, resolve replies, render, persist.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, SecondsFormat, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::TokenProvider;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::fetch::{FetchOptions, FetchOutcome, GraphEndpoints, PageSource, fetch_collection};
use crate::message::ChatMessage;
use crate::render::{ChannelSummary, render_channel_document, render_thread_document};
use crate::replies::ReplyResolver;
use crate::thread::ThreadTree;

/// Name of the metadata index inside a thread directory.
pub const METADATA_FILE: &str = "_metadata.json";

/// Summary stored alongside every export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub team_id: String,
    pub channel_id: String,
    pub exported_at: String,
    pub message_count: usize,
    pub pages_fetched: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replies_included: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// Single-file export: metadata plus the raw message records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub metadata: ExportMetadata,
    pub messages: Vec<Value>,
}

/// What a run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    /// Written JSON file or thread directory.
    pub path: PathBuf,
    pub message_count: usize,
    pub reply_count: usize,
    pub pages_fetched: usize,
    pub files: Vec<String>,
}

/// Everything an [`Exporter`] needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub team_id: String,
    pub channel_id: String,
    pub endpoints: GraphEndpoints,
    pub output_dir: PathBuf,
    /// Options for the channel message listing.
    pub messages: FetchOptions,
    /// Options for each message's reply listing.
    pub replies: FetchOptions,
    /// Minimum spacing between reply fetches of different messages.
    pub reply_delay: Duration,
    /// Fetch replies in threaded exports.
    pub include_replies: bool,
}

impl ExportSettings {
    /// Build settings from configuration; team and channel ids are required.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let team_id = config
            .channel
            .team_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("channel.team_id is not set".to_string()))?;
        let channel_id = config
            .channel
            .channel_id
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Config("channel.channel_id is not set".to_string()))?;

        let fetch = &config.fetch;
        let base = FetchOptions {
            max_items: None,
            page_delay: fetch.page_delay(),
            default_retry_after: fetch.default_retry_after(),
            ..FetchOptions::default()
        };

        Ok(Self {
            team_id,
            channel_id,
            endpoints: GraphEndpoints::new(&config.graph.base_url, config.graph.page_size),
            output_dir: config.export.output_path()?,
            messages: FetchOptions {
                max_items: fetch.max_messages,
                ..base.clone()
            },
            replies: FetchOptions {
                max_items: fetch.max_replies,
                ..base
            },
            reply_delay: fetch.reply_delay(),
            include_replies: config.export.include_replies,
        })
    }
}

/// Runs exports of one channel.
pub struct Exporter<S, A> {
    source: S,
    auth: A,
    settings: ExportSettings,
}

impl<S: PageSource, A: TokenProvider> Exporter<S, A> {
    pub fn new(source: S, auth: A, settings: ExportSettings) -> Self {
        Self {
            source,
            auth,
            settings,
        }
    }

    /// Write every channel message, as received, to one JSON file.
    pub fn export_json(&self) -> Result<ExportSummary> {
        let token = self.auth.access_token()?;
        let outcome = self.fetch_messages(&token)?;

        fs::create_dir_all(&self.settings.output_dir)?;
        let path = self
            .settings
            .output_dir
            .join(format!("messages_{}.json", file_stamp()));

        let metadata = self.metadata(&outcome);
        let message_count = outcome.items.len();
        let pages_fetched = outcome.pages;
        let document = ExportDocument {
            metadata,
            messages: outcome.items,
        };
        fs::write(&path, serde_json::to_string_pretty(&document)?)?;
        info!("wrote {message_count} message(s) to {}", path.display());

        Ok(ExportSummary {
            path,
            message_count,
            reply_count: 0,
            pages_fetched,
            files: Vec::new(),
        })
    }

    /// Write one Markdown document per root message into a fresh directory,
    /// followed by the metadata index.
    ///
    /// Documents are written as soon as each thread is rendered, so a run
    /// aborted later leaves the finished ones in place.
    pub fn export_threads(&self) -> Result<ExportSummary> {
        let token = self.auth.access_token()?;
        let outcome = self.fetch_messages(&token)?;

        let dir = self
            .settings
            .output_dir
            .join(format!("threads_{}", file_stamp()));
        fs::create_dir_all(&dir)?;

        let messages = ChatMessage::from_values(&outcome.items);
        let mut resolver = ReplyResolver::new(
            &self.source,
            &token,
            self.settings.replies.clone(),
            self.settings.reply_delay,
        );

        let roots = messages.iter().filter(|msg| msg.is_root()).count();
        if roots < messages.len() {
            debug!(
                "skipping {} reply(ies) listed at channel level",
                messages.len() - roots
            );
        }

        let mut names = ThreadFileNames::new();
        let mut files = Vec::new();
        let mut reply_count = 0;
        for msg in messages.iter().filter(|msg| msg.is_root()) {
            let replies = if self.settings.include_replies {
                let url = self.settings.endpoints.replies_url(
                    &self.settings.team_id,
                    &self.settings.channel_id,
                    &msg.id,
                );
                resolver.resolve(&msg.id, &url)
            } else {
                Vec::new()
            };
            reply_count += replies.len();

            let name = names.allocate(&msg.id);
            fs::write(dir.join(&name), render_thread_document(msg, &replies))?;
            files.push(name);
            info!(
                "[{}/{roots}] wrote thread {} ({} reply(ies))",
                files.len(),
                msg.id,
                replies.len()
            );
        }

        let metadata = ExportMetadata {
            reply_count: Some(reply_count),
            replies_included: Some(self.settings.include_replies),
            files: files.clone(),
            ..self.metadata(&outcome)
        };
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        Ok(ExportSummary {
            path: dir,
            message_count: outcome.items.len(),
            reply_count,
            pages_fetched: outcome.pages,
            files,
        })
    }

    fn fetch_messages(&self, token: &str) -> Result<FetchOutcome> {
        let url = self
            .settings
            .endpoints
            .messages_url(&self.settings.team_id, &self.settings.channel_id);
        info!(
            "fetching messages{}",
            self.settings
                .messages
                .max_items
                .map(|max| format!(" (limit: {max})"))
                .unwrap_or_default()
        );
        fetch_collection(&self.source, &url, token, &self.settings.messages)
    }

    fn metadata(&self, outcome: &FetchOutcome) -> ExportMetadata {
        ExportMetadata {
            team_id: self.settings.team_id.clone(),
            channel_id: self.settings.channel_id.clone(),
            exported_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message_count: outcome.items.len(),
            pages_fetched: outcome.pages,
            reply_count: None,
            replies_included: None,
            files: Vec::new(),
        }
    }
}

/// Result of rendering a JSON export into a threaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderSummary {
    pub path: PathBuf,
    pub message_count: usize,
    pub root_threads: usize,
}

/// Render a JSON export file as one threaded Markdown document written
/// next to it as `<stem>_threads.md`.
pub fn render_export_file(input: &Path) -> Result<RenderSummary> {
    let text = fs::read_to_string(input)?;
    let doc: Value = serde_json::from_str(&text)?;

    let records = doc
        .get("messages")
        .and_then(|v| v.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let metadata = doc.get("metadata");
    let summary = ChannelSummary {
        exported_at: metadata
            .and_then(|m| m.get("exported_at"))
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown")
            .to_string(),
        message_count: metadata
            .and_then(|m| m.get("message_count"))
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(0),
    };

    let messages = ChatMessage::from_values(records);
    let message_count = messages.len();
    let tree = ThreadTree::build(messages);
    let orphans = tree.orphans();
    if !orphans.is_empty() {
        warn!(
            "{} parent message(s) missing from export; their replies are omitted",
            orphans.len()
        );
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Path(format!("invalid input file name: {}", input.display())))?;
    let path = input.with_file_name(format!("{stem}_threads.md"));
    fs::write(&path, render_channel_document(&tree, &summary))?;
    info!(
        "rendered {} root thread(s) from {message_count} message(s) to {}",
        tree.roots().len(),
        path.display()
    );

    Ok(RenderSummary {
        path,
        message_count,
        root_threads: tree.roots().len(),
    })
}

/// File name of the document for message `id`.
pub fn thread_file_name(id: &str) -> String {
    format!("thread_{}.md", safe_stem(id))
}

fn safe_stem(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Hands out thread document names that are unique within one directory.
///
/// Ids that sanitize to a name already taken get `_2`, `_3`, ... appended.
#[derive(Debug, Default)]
pub struct ThreadFileNames {
    used: HashSet<String>,
}

impl ThreadFileNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, id: &str) -> String {
        let mut name = thread_file_name(id);
        let mut n = 2;
        while self.used.contains(&name) {
            name = format!("thread_{}_{n}.md", safe_stem(id));
            n += 1;
        }
        if n > 2 {
            warn!("thread {id} written as {name}; its file name was already taken");
        }
        self.used.insert(name.clone());
        name
    }
}

fn file_stamp() -> String {
    Local::now().format("%Y%m%d_%H%M%S").to_string()
}
