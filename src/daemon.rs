/// Background mode: detach from the invoking shell.
///
/// Must run before any runtime threads exist, so it is called from `main`
/// after validation and before the tokio runtime is built.
use nix::unistd::{fork, setsid, ForkResult};

#[derive(Debug)]
pub enum DaemonError {
    Fork { source: nix::Error },
}

impl std::fmt::Display for DaemonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DaemonError::Fork { source } => write!(f, "cannot fork child process: {}", source),
        }
    }
}

impl std::error::Error for DaemonError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DaemonError::Fork { source } => Some(source),
        }
    }
}

/// Which side of the split the caller is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detached {
    /// Original process: exit 0 right away.
    Parent,
    /// Detached child: continue into the loop.
    Child,
}

/// Fork once and start a new session in the child.
pub fn detach() -> Result<Detached, DaemonError> {
    // SAFETY: called before the tokio runtime starts, so the process is
    // single-threaded at this point.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => {
            tracing::debug!(child = child.as_raw(), "forked watcher into background");
            Ok(Detached::Parent)
        }
        Ok(ForkResult::Child) => {
            // Not fatal: the child still works while attached to the old session.
            if let Err(e) = setsid() {
                tracing::warn!(error = %e, "setsid failed, staying in the caller's session");
            }
            Ok(Detached::Child)
        }
        Err(e) => Err(DaemonError::Fork { source: e }),
    }
}
