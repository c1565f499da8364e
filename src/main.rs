mod action;
mod condition;
mod config;
mod daemon;
mod identity;
mod liveness;
mod matcher;
mod watcher;

use clap::error::ErrorKind;
use clap::Parser;
use config::{FileConfig, WatchConfig};
use identity::ProgramIdentity;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use watcher::Outcome;

/// Constantly monitor a log file for specific keywords and execute a command
/// when they appear (or go missing).
#[derive(Parser, Debug)]
#[command(name = "logwatcher", version, about)]
pub struct Cli {
    /// Log file to monitor (may not exist yet at startup)
    #[arg(short = 'f', long, value_name = "FILEPATH")]
    logfile: Option<PathBuf>,

    /// Keyword to catch (repeat for several keywords)
    #[arg(short = 'c', long = "catch", value_name = "KEYWORD")]
    catch: Vec<String>,

    /// Shell command to execute when the condition is met
    #[arg(short = 'e', long, value_name = "COMMAND")]
    execute: Option<String>,

    /// Polling interval in seconds
    #[arg(short = 'n', long, value_name = "SECONDS", allow_negative_numbers = true)]
    interval: Option<i64>,

    /// Timeout in minutes (default: the longest allowed)
    #[arg(short = 't', long, value_name = "MINUTES", allow_negative_numbers = true)]
    timeout: Option<i64>,

    /// Trigger when keywords are missing instead of found
    #[arg(long)]
    missing: bool,

    /// Require all keywords rather than any of them
    #[arg(long)]
    all: bool,

    /// Keep monitoring after the command has been executed
    #[arg(long)]
    stay: bool,

    /// Check exactly once, then exit
    #[arg(long)]
    check_once: bool,

    /// Perform the first check immediately instead of after one interval
    #[arg(long)]
    check_at_start: bool,

    /// Stay in the foreground instead of detaching
    #[arg(long)]
    foreground: bool,

    /// Report every check, not only triggers
    #[arg(short, long)]
    verbose: bool,

    /// Parent process to watch, e.g. ${PPID} (first one wins)
    #[arg(long, value_name = "PID", allow_negative_numbers = true)]
    ppid: Vec<i32>,

    /// Defaults file (default: ./logwatcher.toml when present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "logwatcher=debug"
    } else {
        "logwatcher=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

fn log_summary(config: &WatchConfig, identity: &ProgramIdentity) {
    let host = nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown-host".to_string());
    tracing::info!(
        pid = std::process::id(),
        host = %host,
        "--- {} ---",
        identity.upper_name
    );
    tracing::info!(
        path = %config.logfile.display(),
        interval_secs = config.interval.as_secs(),
        command = %config.command,
        "monitoring {} -- {}",
        config.condition.describe(&config.keywords),
        config.ignore_token
    );
    tracing::info!(
        timeout_mins = config.timeout_minutes_display(),
        parent_pid = ?config.parent_pid,
        stay = config.stay,
        "timeout in ~{} minutes",
        config.timeout_minutes_display()
    );
}

fn main() -> ExitCode {
    let identity = ProgramIdentity::from_env();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_tracing(cli.verbose);
    tracing::debug!(?cli, "parsed CLI arguments");

    let file = match FileConfig::load(cli.config.as_deref()) {
        Ok(f) => f,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };

    let config = match WatchConfig::resolve(&cli, &file, &identity) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::from(1);
        }
    };

    // Fork before the runtime exists; the runtime owns threads and fds.
    if !config.foreground {
        match daemon::detach() {
            Ok(daemon::Detached::Parent) => return ExitCode::SUCCESS,
            Ok(daemon::Detached::Child) => {}
            Err(e) => {
                tracing::error!("{e}");
                return ExitCode::from(1);
            }
        }
    }

    log_summary(&config, &identity);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            return ExitCode::from(1);
        }
    };

    let report = runtime.block_on(watcher::watch(&config));
    if let Outcome::Aborted(reason) = &report.outcome {
        tracing::error!(elapsed_secs = report.elapsed.as_secs(), "{reason}; terminating");
    }
    tracing::debug!(
        outcome = ?report.outcome,
        ticks = report.ticks,
        triggers = report.triggers,
        elapsed_secs = report.elapsed.as_secs(),
        "watcher finished"
    );
    ExitCode::from(report.exit_code())
}
