/// Parent liveness probe.
///
/// The watcher lives alongside the process that started it (normally the
/// invoking shell). When that process goes away the loop aborts.
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;

/// Answers "is the owning process still alive" once per tick.
pub trait ParentProbe {
    fn is_alive(&mut self) -> bool;
}

/// Probe backed by `kill(pid, 0)`, which sends no signal.
#[derive(Debug, Clone, Copy)]
pub struct LivenessGuard {
    pid: i32,
}

impl LivenessGuard {
    pub fn new(pid: i32) -> Self {
        Self { pid }
    }
}

impl ParentProbe for LivenessGuard {
    fn is_alive(&mut self) -> bool {
        is_pid_alive(self.pid)
    }
}

/// Stand-in used when parent checking is disabled in the config file.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParent;

impl ParentProbe for NoParent {
    fn is_alive(&mut self) -> bool {
        true
    }
}

/// Whether a process with `pid` exists. EPERM means it exists but belongs to
/// another user, which still counts as alive.
pub fn is_pid_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        let pid = std::process::id() as i32;
        assert!(LivenessGuard::new(pid).is_alive());
    }

    #[test]
    fn test_reaped_child_is_not_alive() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        assert!(!is_pid_alive(pid));
    }

    #[test]
    fn test_non_positive_pid_is_not_alive() {
        assert!(!is_pid_alive(0));
        assert!(!is_pid_alive(-1));
    }

    #[test]
    fn test_nonexistent_pid() {
        assert!(!is_pid_alive(i32::MAX));
    }

    #[test]
    fn test_no_parent_always_alive() {
        assert!(NoParent.is_alive());
    }
}
