//! teams-export-core: Core library for teams-export.
//!
//! This crate provides everything needed to export a Microsoft Teams channel:
//! - Paginated Graph retrieval with rate-limit handling
//! - Per-message reply resolution
//! - Reply tree reconstruction from flat message listings
//! - Markdown rendering of threads and whole channels
//! - Export orchestration, configuration and token providers

pub mod auth;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod html;
pub mod message;
pub mod paths;
pub mod render;
pub mod replies;
pub mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{ClientCredentials, StaticToken, TokenProvider};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use export::{ExportSettings, ExportSummary, Exporter, render_export_file};
pub use fetch::{FetchOptions, GraphClient, GraphEndpoints, PageSource, fetch_collection};
pub use html::html_to_text;
pub use message::ChatMessage;
pub use paths::AppPaths;
pub use replies::ReplyResolver;
pub use thread::ThreadTree;
