//! lichess-uci: a UCI engine that plays on Lichess.
//!
//! Register this binary as an engine in any UCI GUI. When the GUI asks for a
//! move, the engine challenges the configured Lichess opponent (a bot, by
//! default `maia1`) with your account, relays your moves from the GUI to the
//! game and reports the opponent's replies as `bestmove`.
//!
//! stdout carries the UCI protocol only; logs go to stderr and, with
//! `--log-dir`, to a daily-rotated file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use bridge::Bridge;
use clap::Parser;
use lichess_client::LichessConnector;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

/// Command-line arguments. Each one also has an environment variable, see
/// [`config`].
#[derive(Parser)]
#[command(
    name = "lichess-uci",
    version,
    about = "UCI engine that plays your GUI moves in a Lichess game"
)]
struct Cli {
    /// Lichess API token with the board:play scope. The LichessToken UCI
    /// option overrides it.
    #[arg(long)]
    token: Option<String>,

    /// Lichess server to play on.
    #[arg(long)]
    base_url: Option<String>,

    /// Also write logs to daily-rotated files in this directory.
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Log at debug level and echo progress to the GUI as `info string`.
    #[arg(long)]
    debug: bool,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    /// The log directory could not be created.
    #[error("failed to create log directory {path}: {source}")]
    LogDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Open the rolling log file in `dir`, creating the directory if needed.
fn log_file_appender(dir: &Path) -> Result<RollingFileAppender, CliError> {
    std::fs::create_dir_all(dir).map_err(|source| CliError::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(tracing_appender::rolling::daily(dir, "lichess-uci"))
}

/// Log to stderr, and to `log_dir` when given. The returned guard flushes
/// the file writer when dropped.
fn init_tracing(log_dir: Option<&Path>, debug: bool) -> Result<Option<WorkerGuard>, CliError> {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(log_file_appender(dir)?);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let base_url = cli.base_url.unwrap_or_else(config::get_base_url);
    let token = cli.token.or_else(config::get_token);
    let bridge_config = config::bridge_config(token, cli.debug);

    tracing::info!(base_url = %base_url, "lichess-uci {} starting", env!("CARGO_PKG_VERSION"));
    let connector = Arc::new(LichessConnector::new(base_url));
    Bridge::new(bridge_config, connector)
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("UCI session failed")?;

    tracing::info!("lichess-uci exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().or_else(config::get_log_dir);
    let guard = init_tracing(log_dir.as_deref(), cli.debug)?;

    let result = run(cli).await;
    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    drop(guard);

    // The runtime would otherwise wait on the blocking stdin read until the
    // GUI sends another line.
    std::process::exit(if result.is_ok() { 0 } else { 1 });
}
