/// Host shell execution: the triggered action and the startup resolvability check.
use std::process::Stdio;
use tokio::process::Command;

/// Errors from running the configured command. Never fatal to the loop.
#[derive(Debug)]
pub enum ActionError {
    /// The shell could not be started.
    Spawn { source: std::io::Error },
    /// The command ran but returned non-zero (or was killed by a signal).
    Failed { code: Option<i32> },
}

impl std::fmt::Display for ActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionError::Spawn { source } => write!(f, "failed to start shell: {}", source),
            ActionError::Failed { code: Some(code) } => {
                write!(f, "command exited with status {code}")
            }
            ActionError::Failed { code: None } => write!(f, "command was terminated by a signal"),
        }
    }
}

impl std::error::Error for ActionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ActionError::Spawn { source } => Some(source),
            ActionError::Failed { .. } => None,
        }
    }
}

/// Runs a command string when the watch condition triggers.
pub trait Executor {
    async fn execute(&mut self, command: &str) -> Result<(), ActionError>;
}

/// Executes through `sh -c`, inheriting the watcher's stdio, and waits for completion.
#[derive(Debug, Default)]
pub struct ActionRunner;

impl Executor for ActionRunner {
    async fn execute(&mut self, command: &str) -> Result<(), ActionError> {
        tracing::debug!(command, "spawning shell");
        let status = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| ActionError::Spawn { source: e })?;

        if status.success() {
            Ok(())
        } else {
            Err(ActionError::Failed {
                code: status.code(),
            })
        }
    }
}

/// Whether the first word of `command` resolves in the host shell (`command -v`).
pub fn command_resolves(command: &str) -> bool {
    let Some(program) = command.split_whitespace().next() else {
        return false;
    };
    std::process::Command::new("sh")
        .arg("-c")
        .arg("command -v \"$1\" >/dev/null 2>&1")
        .arg("sh")
        .arg(program)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
