//! teams-export CLI - Microsoft Teams channel exporter.

use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use env_logger::fmt::WriteStyle;
use log::{LevelFilter, debug};
use serde::Serialize;
use serde_json::Value;
use teams_export_core::auth::{TokenProvider, provider_from_config};
use teams_export_core::{
    AppConfig, AppPaths, ExportSettings, Exporter, GraphClient, render_export_file,
};

const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Replacement shown for secrets in `config show`.
const REDACTED: &str = "********";

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    // `init` writes the default config itself and must see whether one exists.
    let seed_default = !matches!(cli.command, Command::Init(_));
    let ctx = RuntimeContext::new(cli.common.clone(), seed_default)?;
    ctx.init_logging()?;
    debug!("config loaded from {}", ctx.paths.global_config.display());

    match cli.command {
        Command::Export(args) => handle_export(&ctx, args),
        Command::Threads(args) => handle_threads(&ctx, args),
        Command::Render(args) => handle_render(&ctx, args),
        Command::Config { command } => handle_config(&ctx, command),
        Command::Init(cmd) => handle_init(&ctx, cmd),
        Command::Completions { shell } => handle_completions(shell),
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Export Microsoft Teams channel messages and threads via Microsoft Graph.",
    propagate_version = true
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::SetTrue, global = true)]
    quiet: bool,
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[arg(long, global = true)]
    debug: bool,
    #[arg(long, global = true)]
    trace: bool,
    #[arg(long, global = true, conflicts_with = "yaml")]
    json: bool,
    #[arg(long, global = true)]
    yaml: bool,
    #[arg(long = "no-color", global = true, conflicts_with = "color")]
    no_color: bool,
    #[arg(long, value_enum, default_value_t = ColorOption::Auto, global = true)]
    color: ColorOption,
    #[arg(long = "dry-run", global = true)]
    dry_run: bool,
    #[arg(short = 'y', long = "yes", global = true)]
    assume_yes: bool,
    /// Per-request timeout (overrides graph.timeout_secs)
    #[arg(long = "timeout", value_name = "SECONDS", global = true)]
    timeout: Option<u64>,
    #[arg(long = "diagnostics", global = true)]
    diagnostics: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorOption {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Export channel messages to a single JSON file
    Export(ExportArgs),
    /// Export one Markdown document per thread, with replies
    Threads(ThreadsArgs),
    /// Render a JSON export as one threaded Markdown document
    Render(RenderArgs),
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    Init(InitCommand),
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by the commands that talk to Graph.
#[derive(Debug, Clone, Args)]
struct ChannelArgs {
    /// Team ID (overrides channel.team_id)
    #[arg(long = "team", env = "TEAM_ID")]
    team_id: Option<String>,
    /// Channel ID (overrides channel.channel_id)
    #[arg(long = "channel", env = "CHANNEL_ID")]
    channel_id: Option<String>,
    /// Bearer token to use instead of the configured credentials
    #[arg(long, env = "TEAMS_EXPORT_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Maximum number of messages to export
    #[arg(short = 'm', long = "max-messages", env = "MAX_MESSAGES")]
    max_messages: Option<usize>,
    /// Output directory (overrides export.output_dir)
    #[arg(short = 'o', long = "output", env = "OUTPUT_DIR")]
    output_dir: Option<String>,
}

impl ChannelArgs {
    fn apply(&self, config: &AppConfig) -> AppConfig {
        let mut config = config.clone();
        if let Some(team) = &self.team_id {
            config.channel.team_id = Some(team.clone());
        }
        if let Some(channel) = &self.channel_id {
            config.channel.channel_id = Some(channel.clone());
        }
        if let Some(token) = &self.token {
            config.auth.access_token = Some(token.clone());
        }
        if let Some(max) = self.max_messages {
            config.fetch.max_messages = Some(max);
        }
        if let Some(dir) = &self.output_dir {
            config.export.output_dir = dir.clone();
        }
        config
    }
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[command(flatten)]
    channel: ChannelArgs,
}

#[derive(Debug, Args)]
struct ThreadsArgs {
    #[command(flatten)]
    channel: ChannelArgs,
    /// Skip reply retrieval
    #[arg(long = "no-replies")]
    no_replies: bool,
    /// Maximum number of replies per message
    #[arg(long = "max-replies")]
    max_replies: Option<usize>,
    /// Delay between reply fetches, in milliseconds
    #[arg(long = "reply-delay", value_name = "MS")]
    reply_delay_ms: Option<u64>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    /// JSON file written by `export`
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
enum ConfigCommand {
    Show,
    Path,
    Reset,
}

#[derive(Debug, Clone, Args)]
struct InitCommand {
    #[arg(long = "force")]
    force: bool,
}

#[derive(Debug, Clone)]
struct RuntimeContext {
    common: CommonOpts,
    paths: AppPaths,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts, seed_default: bool) -> Result<Self> {
        let paths = AppPaths::discover(common.config.clone()).map_err(|e| anyhow!("{e}"))?;
        Self::with_paths(common, paths, seed_default)
    }

    fn with_paths(common: CommonOpts, paths: AppPaths, seed_default: bool) -> Result<Self> {
        if seed_default {
            AppConfig::ensure_default(&paths.global_config).map_err(|e| anyhow!("{e}"))?;
        }
        let config = AppConfig::load(&paths).map_err(|e| anyhow!("{e}"))?;
        Ok(Self {
            common,
            paths,
            config,
        })
    }

    fn init_logging(&self) -> Result<()> {
        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

        if let Some(level) = self.effective_log_level() {
            builder.filter_level(level);
        }

        let force_color = matches!(self.common.color, ColorOption::Always)
            || env::var_os("FORCE_COLOR").is_some();
        let disable_color = self.common.no_color
            || matches!(self.common.color, ColorOption::Never)
            || env::var_os("NO_COLOR").is_some();

        if disable_color {
            builder.write_style(WriteStyle::Never);
        } else if force_color {
            builder.write_style(WriteStyle::Always);
        } else {
            builder.write_style(WriteStyle::Auto);
        }

        if self.common.diagnostics {
            builder.format_timestamp_millis();
            builder.format_module_path(true);
            builder.format_target(true);
        } else {
            builder.format_timestamp(None);
            builder.format_target(false);
        }

        builder.try_init().or_else(|err| {
            if self.common.verbose > 0 {
                eprintln!("logger already initialized: {err}");
            }
            Ok(())
        })
    }

    /// Level forced by command-line flags; `None` leaves `RUST_LOG` in charge.
    fn effective_log_level(&self) -> Option<LevelFilter> {
        if self.common.trace {
            Some(LevelFilter::Trace)
        } else if self.common.debug {
            Some(LevelFilter::Debug)
        } else {
            match self.common.verbose {
                0 => None,
                1 => Some(LevelFilter::Debug),
                _ => Some(LevelFilter::Trace),
            }
        }
    }

    fn timeout(&self, config: &AppConfig) -> Duration {
        Duration::from_secs(self.common.timeout.unwrap_or(config.graph.timeout_secs))
    }

    fn exporter(&self, config: &AppConfig) -> Result<Exporter<GraphClient, Box<dyn TokenProvider>>> {
        let timeout = self.timeout(config);
        let settings = ExportSettings::from_config(config).context("resolving export settings")?;
        let client = GraphClient::new(Some(timeout)).context("creating Graph client")?;
        let auth = provider_from_config(&config.auth, Some(timeout))?;
        Ok(Exporter::new(client, auth, settings))
    }
}

fn handle_export(ctx: &RuntimeContext, args: ExportArgs) -> Result<()> {
    let config = args.channel.apply(&ctx.config);
    if ctx.common.dry_run {
        return describe_plan(ctx, &config, "json");
    }

    let exporter = ctx.exporter(&config)?;
    let summary = exporter
        .export_json()
        .context("exporting channel messages")?;
    emit_output(&ctx.common, &summary)
}

fn handle_threads(ctx: &RuntimeContext, args: ThreadsArgs) -> Result<()> {
    let mut config = args.channel.apply(&ctx.config);
    if args.no_replies {
        config.export.include_replies = false;
    }
    if let Some(max) = args.max_replies {
        config.fetch.max_replies = Some(max);
    }
    if let Some(ms) = args.reply_delay_ms {
        config.fetch.reply_delay_ms = ms;
    }
    if ctx.common.dry_run {
        return describe_plan(ctx, &config, "threads");
    }

    let exporter = ctx.exporter(&config)?;
    let summary = exporter
        .export_threads()
        .context("exporting channel threads")?;
    emit_output(&ctx.common, &summary)
}

fn handle_render(ctx: &RuntimeContext, args: RenderArgs) -> Result<()> {
    let summary = render_export_file(&args.input)
        .with_context(|| format!("rendering {}", args.input.display()))?;
    emit_output(&ctx.common, &summary)
}

/// Print what an export would do without contacting Graph.
fn describe_plan(ctx: &RuntimeContext, config: &AppConfig, layout: &str) -> Result<()> {
    let settings = ExportSettings::from_config(config).context("resolving export settings")?;
    let plan = serde_json::json!({
        "dry_run": true,
        "layout": layout,
        "team_id": settings.team_id,
        "channel_id": settings.channel_id,
        "messages_url": settings.endpoints.messages_url(&settings.team_id, &settings.channel_id),
        "output_dir": settings.output_dir.display().to_string(),
        "max_messages": settings.messages.max_items,
        "max_replies": settings.replies.max_items,
        "include_replies": layout == "threads" && settings.include_replies,
    });
    emit_output(&ctx.common, &plan)
}

fn handle_config(ctx: &RuntimeContext, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show => emit_output(&ctx.common, &redacted(&ctx.config)),
        ConfigCommand::Path => {
            println!("{}", ctx.paths.global_config.display());
            Ok(())
        }
        ConfigCommand::Reset => {
            AppConfig::write_default(&ctx.paths.global_config).map_err(|e| anyhow!("{e}"))
        }
    }
}

fn redacted(config: &AppConfig) -> AppConfig {
    let mut config = config.clone();
    if config.auth.client_secret.is_some() {
        config.auth.client_secret = Some(REDACTED.to_string());
    }
    if config.auth.access_token.is_some() {
        config.auth.access_token = Some(REDACTED.to_string());
    }
    config
}

fn handle_init(ctx: &RuntimeContext, cmd: InitCommand) -> Result<()> {
    if ctx.paths.global_config.exists() && !(cmd.force || ctx.common.assume_yes) {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            ctx.paths.global_config.display()
        ));
    }
    if ctx.common.dry_run {
        println!(
            "dry-run: would write default config to {}",
            ctx.paths.global_config.display()
        );
        return Ok(());
    }
    AppConfig::write_default(&ctx.paths.global_config).map_err(|e| anyhow!("{e}"))
}

fn handle_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, APP_NAME, &mut io::stdout());
    Ok(())
}

fn emit_output<T: ?Sized + Serialize + std::fmt::Debug>(
    opts: &CommonOpts,
    value: &T,
) -> Result<()> {
    if opts.json {
        let json = serde_json::to_string_pretty(value)?;
        println!("{json}");
        return Ok(());
    }
    if opts.yaml {
        let yaml = serde_yaml::to_string(value)?;
        println!("{yaml}");
        return Ok(());
    }

    let v = serde_json::to_value(value)?;
    pretty_print_value(&v, 0);
    Ok(())
}

fn pretty_print_value(v: &Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match v {
        Value::Object(map) => {
            for (key, value) in map {
                match value {
                    Value::Object(_) => {
                        println!("{indent}{key}:");
                        pretty_print_value(value, depth + 1);
                    }
                    Value::Array(items) if items.is_empty() => println!("{indent}{key}: -"),
                    Value::Array(_) => {
                        println!("{indent}{key}:");
                        pretty_print_value(value, depth + 1);
                    }
                    _ => println!("{indent}{key}: {}", scalar(value)),
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(_) | Value::Array(_) => pretty_print_value(item, depth),
                    _ => println!("{indent}- {}", scalar(item)),
                }
            }
        }
        _ => println!("{indent}{}", scalar(v)),
    }
}

fn scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}
