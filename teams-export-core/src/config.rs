//! Configuration management for teams-export.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::paths::{AppPaths, expand_str_path};

const APP_NAME: &str = "teams-export";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Microsoft Graph endpoint settings.
    pub graph: GraphConfig,
    /// Credentials used to obtain a bearer token.
    pub auth: AuthConfig,
    /// Channel to export.
    pub channel: ChannelConfig,
    /// Pagination limits and pacing.
    pub fetch: FetchConfig,
    /// Output settings.
    pub export: ExportConfig,
}

/// Microsoft Graph endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Base URL including the API version.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Items requested per page (`$top`).
    pub page_size: u32,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            timeout_secs: 30,
            page_size: 50,
        }
    }
}

/// Credentials for the client-credentials flow, or a pre-acquired token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Identity provider authority host.
    pub authority: String,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Bearer token used as-is; takes precedence over client credentials.
    pub access_token: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authority: "https://login.microsoftonline.com".to_string(),
            tenant_id: None,
            client_id: None,
            client_secret: None,
            access_token: None,
        }
    }
}

/// Source team and channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub team_id: Option<String>,
    pub channel_id: Option<String>,
}

/// Pagination limits and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of channel messages (unset = all).
    pub max_messages: Option<usize>,
    /// Maximum number of replies per message (unset = all).
    pub max_replies: Option<usize>,
    /// Delay between pages of one collection, in milliseconds.
    pub page_delay_ms: u64,
    /// Delay between reply fetches of different messages, in milliseconds.
    pub reply_delay_ms: u64,
    /// Wait applied when a 429 response carries no Retry-After header.
    pub default_retry_after_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_messages: None,
            max_replies: None,
            page_delay_ms: 500,
            reply_delay_ms: 250,
            default_retry_after_secs: 60,
        }
    }
}

impl FetchConfig {
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }

    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }

    pub fn default_retry_after(&self) -> Duration {
        Duration::from_secs(self.default_retry_after_secs)
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Directory receiving export files. Shell variables and `~` are expanded.
    pub output_dir: String,
    /// Whether threaded exports fetch replies for every message.
    pub include_replies: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: "./exports".to_string(),
            include_replies: true,
        }
    }
}

impl ExportConfig {
    /// Output directory with shell expansion applied.
    pub fn output_path(&self) -> Result<PathBuf> {
        expand_str_path(&self.output_dir)
    }
}

impl AppConfig {
    /// Load configuration from paths with environment overlay.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        let env_prefix = env_prefix();
        let mut builder = Config::builder()
            .add_source(
                File::from(paths.global_config.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                File::from(paths.local_config.as_path())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(&env_prefix)
                    .prefix_separator("__")
                    .separator("__"),
            );

        if let Some(cli_cfg) = &paths.cli_config {
            builder = builder.add_source(
                File::from(cli_cfg.as_path())
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }

        let defaults = AppConfig::default();
        builder = builder
            .set_default("graph.base_url", defaults.graph.base_url)?
            .set_default("graph.timeout_secs", defaults.graph.timeout_secs as i64)?
            .set_default("graph.page_size", i64::from(defaults.graph.page_size))?
            .set_default("auth.authority", defaults.auth.authority)?
            .set_default("fetch.page_delay_ms", defaults.fetch.page_delay_ms as i64)?
            .set_default("fetch.reply_delay_ms", defaults.fetch.reply_delay_ms as i64)?
            .set_default(
                "fetch.default_retry_after_secs",
                defaults.fetch.default_retry_after_secs as i64,
            )?
            .set_default("export.output_dir", defaults.export.output_dir)?
            .set_default("export.include_replies", defaults.export.include_replies)?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Write default config to a path.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("creating config directory {parent:?}: {e}")))?;
        }
        let cfg = AppConfig::default();
        let toml = toml::to_string_pretty(&cfg)
            .map_err(|e| Error::Config(format!("serializing default config: {e}")))?;
        let mut content = String::new();
        content.push_str("# teams-export configuration\n");
        content.push_str(
            "# Place this file at $XDG_CONFIG_HOME/teams-export/config.toml (or ~/.config/teams-export/config.toml)\n",
        );
        content.push_str("#\n");
        content.push_str("# [auth] tenant_id, client_id and client_secret select the client-credentials flow;\n");
        content.push_str("# access_token is used verbatim when set.\n");
        content.push_str("# [channel] team_id and channel_id pick the channel to export.\n\n");
        content.push_str(&toml);
        content.push('\n');
        fs::write(path, content)
            .map_err(|e| Error::Config(format!("writing config file to {}: {e}", path.display())))
    }

    /// Ensure default config exists, creating it if necessary.
    pub fn ensure_default(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        Self::write_default(path)
    }
}

/// Generate environment variable prefix from app name.
fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
