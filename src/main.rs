// ABOUTME: Entry point: parses CLI flags, loads config, starts the bot service, and waits for Ctrl-C.
// ABOUTME: --console echoes connection status and errors to the terminal.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use slackbot::rtm::{HttpRtmApi, RtmClient, WebSocketTransport};
use slackbot::service::{BotService, ServiceSettings};
use slackbot_core::config::Config;
use slackbot_core::{ErrorReporter, LogReporter};
use tokio_util::sync::CancellationToken;

/// Real-time chat bot that routes messages through configurable sinks.
#[derive(Parser, Debug)]
#[command(name = "slackbot", version, about)]
struct Cli {
    /// Run in the foreground and echo status and errors to the terminal
    #[arg(long)]
    console: bool,

    /// Path to config.toml (otherwise SLACKBOT_CONFIG_PATH, ./config.toml, then the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    let config = match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    // Service runs keep file logs even when no directory is configured
    let log_dir = config
        .logging
        .dir
        .as_ref()
        .map(PathBuf::from)
        .or_else(|| (!cli.console).then(slackbot::paths::log_dir));
    let _log_guard = slackbot::logging::init(log_dir.as_deref())?;

    tracing::info!(
        api_base_url = %config.slack.api_base_url,
        sinks = config.sinks.len(),
        pull_requests = config.pull_requests.is_some(),
        reconnect_delay_secs = config.slack.reconnect_delay_secs,
        "Configuration loaded"
    );

    let reporter: Arc<dyn ErrorReporter> = Arc::new(LogReporter::new(cli.console));
    let client = RtmClient::new(
        Arc::new(HttpRtmApi::new(config.slack.api_base_url.clone())),
        Arc::new(WebSocketTransport::new()),
    );

    // Cancels in-flight sink initialization when we exit before it finishes
    let init_cancel = CancellationToken::new();

    #[cfg(feature = "tfs")]
    let (sinks, feeds) = (
        slackbot::tfs::build_sinks(&config, &init_cancel),
        slackbot::tfs::build_feeds(&config),
    );
    #[cfg(not(feature = "tfs"))]
    let (sinks, feeds) = (Vec::new(), Vec::new());

    let service = BotService::start(
        client,
        ServiceSettings::from_config(&config.slack, cli.console),
        sinks,
        feeds,
        reporter,
    )
    .await;

    if cli.console {
        println!("Running. Press Ctrl-C to stop.");
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    init_cancel.cancel();
    service.stop().await;
    Ok(())
}
