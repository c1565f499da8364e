use crate::action;
use crate::condition::Condition;
use crate::identity::ProgramIdentity;
use crate::Cli;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);
pub const MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Slack added to the single-shot timeout when the first check is delayed.
pub const SINGLE_SHOT_EPSILON: Duration = Duration::from_secs(1);

/// Defaults file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "logwatcher.toml";

/// Defaults loaded from `logwatcher.toml`. CLI values take precedence.
#[derive(Debug, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct FileConfig {
    pub watch: WatchDefaults,
    pub guard: GuardConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WatchDefaults {
    pub logfile: Option<PathBuf>,
    pub keywords: Vec<String>,
    pub command: Option<String>,
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Abort when the parent process goes away.
    pub check_parent: bool,
}

impl Default for WatchDefaults {
    fn default() -> Self {
        Self {
            logfile: None,
            keywords: Vec::new(),
            command: None,
            interval_secs: DEFAULT_INTERVAL.as_secs(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { check_parent: true }
    }
}

impl FileConfig {
    /// Load the defaults file.
    ///
    /// An explicit path must exist. The implicit `logwatcher.toml` is optional
    /// and built-in defaults are used when it is absent.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, required) = match explicit {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) if !required && e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::ReadFile { path, source: e }),
        };

        toml::from_str(&text).map_err(|e| ConfigError::Parse { path, source: e })
    }
}

/// Fully resolved, immutable watch settings.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub logfile: PathBuf,
    pub keywords: Vec<String>,
    pub condition: Condition,
    pub interval: Duration,
    pub timeout: Duration,
    pub check_once: bool,
    pub check_at_start: bool,
    pub stay: bool,
    pub verbose: bool,
    pub foreground: bool,
    pub command: String,
    pub ignore_token: String,
    /// Process whose death aborts the watcher. `None` when the guard is disabled.
    pub parent_pid: Option<i32>,
}

/// Configuration problems detected before the loop starts.
#[derive(Debug)]
pub enum ConfigError {
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    MissingLogfile,
    NoKeywords,
    NoCommand,
    RecursiveInvocation {
        name: String,
    },
    InvalidCommand {
        command: String,
    },
    NoParentPid,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadFile { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::MissingLogfile => write!(
                f,
                "no log file was specified; use --logfile <filepath>"
            ),
            ConfigError::NoKeywords => write!(
                f,
                "no keyword was specified; use --catch <keyword>"
            ),
            ConfigError::NoCommand => write!(
                f,
                "no command was specified; use --execute <command>"
            ),
            ConfigError::RecursiveInvocation { name } => write!(
                f,
                "possible recursive invocation with --stay set: '{name}' appears in the command"
            ),
            ConfigError::InvalidCommand { command } => write!(
                f,
                "the command \"{command}\" does not resolve in the shell"
            ),
            ConfigError::NoParentPid => write!(
                f,
                "cannot determine the parent process id; pass --ppid ${{PPID}}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFile { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Interval from `-n`: absolute value, zero falls back to the default.
fn interval_from_cli(secs: i64) -> Duration {
    if secs == 0 {
        warn!("invalid --interval value, using the default");
        return DEFAULT_INTERVAL;
    }
    Duration::from_secs(secs.unsigned_abs())
}

/// Timeout from `-t` (minutes): absolute value, zero means the longest allowed.
fn timeout_from_cli(mins: i64) -> Duration {
    let secs = mins.unsigned_abs().saturating_mul(60);
    if secs == 0 {
        warn!("invalid --timeout value, using the longest allowed");
        return MAX_TIMEOUT;
    }
    Duration::from_secs(secs)
}

/// Clamp the interval to its permitted range. Single-shot mode may use
/// intervals up to `MAX_TIMEOUT`.
pub fn clamp_interval(interval: Duration, check_once: bool) -> Duration {
    if interval < MIN_INTERVAL {
        warn!(
            interval_secs = interval.as_secs(),
            "interval shorter than permitted, using the shortest allowed"
        );
        return MIN_INTERVAL;
    }
    let upper = if check_once { MAX_TIMEOUT } else { MAX_INTERVAL };
    if interval > upper {
        warn!(
            interval_secs = interval.as_secs(),
            "interval longer than permitted, using the longest allowed"
        );
        return upper;
    }
    interval
}

/// Clamp the total timeout, defaulting to `MAX_TIMEOUT` when unset.
pub fn clamp_timeout(timeout: Option<Duration>) -> Duration {
    match timeout {
        None => MAX_TIMEOUT,
        Some(t) if t > MAX_TIMEOUT => {
            warn!("timeout longer than permitted, using the longest allowed");
            MAX_TIMEOUT
        }
        Some(t) => t,
    }
}

/// Timeout forced by single-shot mode.
pub fn single_shot_timeout(interval: Duration, check_at_start: bool) -> Duration {
    if check_at_start {
        interval
    } else {
        interval + SINGLE_SHOT_EPSILON
    }
}

impl WatchConfig {
    /// Merge CLI values over file defaults, clamp, and validate.
    pub fn resolve(
        cli: &Cli,
        file: &FileConfig,
        identity: &ProgramIdentity,
    ) -> Result<Self, ConfigError> {
        let interval = match cli.interval {
            Some(secs) => interval_from_cli(secs),
            None if file.watch.interval_secs == 0 => DEFAULT_INTERVAL,
            None => Duration::from_secs(file.watch.interval_secs),
        };
        let interval = clamp_interval(interval, cli.check_once);

        let mut timeout = clamp_timeout(cli.timeout.map(timeout_from_cli));
        let mut stay = cli.stay;
        if cli.check_once {
            timeout = single_shot_timeout(interval, cli.check_at_start);
            if stay {
                stay = false;
                warn!("--check-once is set, so --stay will be ignored");
            }
        }

        // The file itself is not required to exist yet.
        let logfile = cli
            .logfile
            .clone()
            .or_else(|| file.watch.logfile.clone())
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingLogfile)?;

        let keywords = if cli.catch.is_empty() {
            file.watch.keywords.clone()
        } else {
            cli.catch.clone()
        };
        if keywords.is_empty() {
            return Err(ConfigError::NoKeywords);
        }

        let command = cli
            .execute
            .clone()
            .or_else(|| file.watch.command.clone())
            .filter(|c| !c.trim().is_empty())
            .ok_or(ConfigError::NoCommand)?;
        if command.contains(identity.name.as_str()) {
            if stay {
                return Err(ConfigError::RecursiveInvocation {
                    name: identity.name.clone(),
                });
            }
            warn!(name = %identity.name, "possible recursive invocation: program name appears in the command");
        }
        if !action::command_resolves(&command) {
            return Err(ConfigError::InvalidCommand { command });
        }

        let parent_pid = if file.guard.check_parent {
            let pid = cli
                .ppid
                .first()
                .copied()
                .unwrap_or_else(|| nix::unistd::getppid().as_raw());
            if pid <= 0 {
                return Err(ConfigError::NoParentPid);
            }
            Some(pid)
        } else {
            None
        };

        Ok(Self {
            logfile,
            keywords,
            condition: Condition::new(!cli.missing, cli.all),
            interval,
            timeout,
            check_once: cli.check_once,
            check_at_start: cli.check_at_start,
            stay,
            verbose: cli.verbose,
            foreground: cli.foreground,
            command,
            ignore_token: identity.ignore_token.clone(),
            parent_pid,
        })
    }

    /// Timeout rounded up to whole minutes, for display only.
    pub fn timeout_minutes_display(&self) -> u64 {
        self.timeout.as_secs().div_ceil(60)
    }
}
