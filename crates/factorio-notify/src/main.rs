//! `factorio-notify`
//!
//! Runs a Factorio server (or any command), echoes its stdout, and posts
//! player join/leave lines to a Discord webhook. Exits with the server's
//! own exit code.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use factorio_notify::config::{NotifyConfig, SourceConfig, parse_duration};
use factorio_notify::orchestrator::{self, Outcome};
use factorio_notify::signals::spawn_signal_listener;

#[derive(Parser, Debug)]
#[command(name = "factorio-notify")]
#[command(
    version,
    about = "Supervise a Factorio server and post join/leave events to Discord"
)]
struct Args {
    /// Discord webhook URL events are posted to
    #[arg(long, env = "DISCORD_WEBHOOK_URL")]
    webhook_url: String,

    /// Name the webhook messages are posted under
    #[arg(long, env = "DISCORD_WEBHOOK_USERNAME")]
    username: String,

    /// Time to wait after SIGINT before killing the server (e.g. "10s", "1m30s")
    #[arg(
        long,
        env = "WAIT_DELAY",
        value_parser = parse_duration,
        required_unless_present = "tail"
    )]
    wait_delay: Option<Duration>,

    /// Follow this log file instead of running a command
    #[arg(long, value_name = "FILE", conflicts_with = "command")]
    tail: Option<PathBuf>,

    /// Poll interval when following a log file
    #[arg(
        long,
        default_value = "1s",
        env = "FACTORIO_NOTIFY_POLL_INTERVAL",
        value_parser = parse_duration
    )]
    poll_interval: Duration,

    /// Log level filter (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "FACTORIO_NOTIFY_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "FACTORIO_NOTIFY_LOG_JSON")]
    log_json: bool,

    /// Command to supervise, followed by its arguments
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        required_unless_present = "tail",
        value_name = "COMMAND"
    )]
    command: Vec<String>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<NotifyConfig> {
        let source = if let Some(path) = self.tail {
            SourceConfig::Tail {
                path,
                poll_interval: self.poll_interval,
            }
        } else {
            SourceConfig::Supervise {
                argv: self.command,
                grace: self.wait_delay.context("WAIT_DELAY is required")?,
            }
        };
        NotifyConfig::new(self.username, &self.webhook_url, source)
            .context("invalid configuration")
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_filter = factorio_notify_core::tracing_init::default_filter(&args.log_level);
    factorio_notify_core::tracing_init::init_tracing(&log_filter, args.log_json);

    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Configuration error");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        username = %config.username,
        "Starting factorio-notify"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    if let Err(e) = spawn_signal_listener(shutdown_tx) {
        error!(error = %e, "Failed to install signal handlers");
        return ExitCode::FAILURE;
    }

    match orchestrator::run(&config, tokio::io::stdout(), shutdown_rx).await {
        Ok(Outcome::Supervised(outcome)) => match outcome.exit.code() {
            Ok(code) => {
                info!(code, forced = outcome.exit.forced, "Server exited");
                exit_code(code)
            }
            Err(e) => {
                error!(error = %e, "Server did not exit normally");
                ExitCode::FAILURE
            }
        },
        Ok(Outcome::Tailed(stats)) => {
            info!(lines = stats.lines, delivered = stats.delivered, "Stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Fatal error");
            ExitCode::FAILURE
        }
    }
}

/// Exit codes outside `0..=255` cannot be passed through; report failure.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
