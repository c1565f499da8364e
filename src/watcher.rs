/// The polling loop: liveness check, file scan, condition, action, sleep.
///
/// Elapsed time is logical. It advances by exactly one interval per sleep,
/// independent of how long the scan or the command took.
use crate::action::{ActionRunner, Executor};
use crate::config::WatchConfig;
use crate::liveness::{LivenessGuard, NoParent, ParentProbe};
use crate::matcher::{KeywordMatcher, MatchError};
use std::time::Duration;
use tracing::{debug, error, info};

/// Why the loop stopped early.
#[derive(Debug)]
pub enum AbortReason {
    /// The owning process is gone.
    ParentDead { pid: Option<i32> },
    /// The watched file could not be read at check time.
    FileUnavailable(MatchError),
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbortReason::ParentDead { pid: Some(pid) } => {
                write!(f, "parent process (PPID={pid}) does not exist")
            }
            AbortReason::ParentDead { pid: None } => write!(f, "parent process does not exist"),
            AbortReason::FileUnavailable(e) => write!(f, "{e}"),
        }
    }
}

/// Terminal state of a run.
#[derive(Debug)]
pub enum Outcome {
    /// The condition held and the command ran. In stay mode, at least once before timeout.
    Triggered,
    /// Timeout reached without the condition ever holding.
    Expired,
    Aborted(AbortReason),
}

/// Summary of a finished run.
#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    /// Number of ticks executed.
    pub ticks: u32,
    /// Number of ticks where the command was run.
    pub triggers: u32,
    /// Logical elapsed time when the loop stopped.
    pub elapsed: Duration,
}

impl RunReport {
    /// Process exit status for this run.
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            Outcome::Aborted(_) => 1,
            Outcome::Triggered | Outcome::Expired => 0,
        }
    }
}

#[derive(Debug, Default)]
struct LoopState {
    elapsed: Duration,
    ticks: u32,
    triggers: u32,
}

enum Tick {
    Idle,
    Triggered,
    Abort(AbortReason),
}

pub struct Watcher<'a, P, E> {
    config: &'a WatchConfig,
    matcher: KeywordMatcher,
    probe: P,
    executor: E,
}

impl<'a, P: ParentProbe, E: Executor> Watcher<'a, P, E> {
    pub fn new(config: &'a WatchConfig, probe: P, executor: E) -> Self {
        Self {
            config,
            matcher: KeywordMatcher::new(config.keywords.clone(), config.ignore_token.clone()),
            probe,
            executor,
        }
    }

    /// Run until triggered (without stay), timeout, or abort.
    pub async fn run(&mut self) -> RunReport {
        let config = self.config;
        let mut state = LoopState::default();

        if !config.check_at_start {
            tokio::time::sleep(config.interval).await;
            state.elapsed = config.interval;
        }

        while state.elapsed <= config.timeout {
            match self.tick(&mut state).await {
                Tick::Abort(reason) => return finish(state, Outcome::Aborted(reason)),
                Tick::Triggered if !config.stay => return finish(state, Outcome::Triggered),
                Tick::Triggered | Tick::Idle => {}
            }

            // Single-shot: the forced timeout already bounds the loop to one
            // tick, except that with check-at-start it equals the interval.
            if config.check_once {
                break;
            }

            tokio::time::sleep(config.interval).await;
            state.elapsed += config.interval;
        }

        if state.triggers > 0 {
            info!(triggers = state.triggers, "timeout reached");
            finish(state, Outcome::Triggered)
        } else {
            if config.verbose {
                info!("timeout reached without the condition being met");
            }
            finish(state, Outcome::Expired)
        }
    }

    async fn tick(&mut self, state: &mut LoopState) -> Tick {
        let config = self.config;
        state.ticks += 1;
        debug!(
            tick = state.ticks,
            elapsed_secs = state.elapsed.as_secs(),
            "checking"
        );

        if !self.probe.is_alive() {
            return Tick::Abort(AbortReason::ParentDead {
                pid: config.parent_pid,
            });
        }

        let presence = match self.matcher.scan(&config.logfile) {
            Ok(p) => p,
            Err(e) => return Tick::Abort(AbortReason::FileUnavailable(e)),
        };

        if !config.condition.evaluate(&presence) {
            if config.verbose {
                info!(
                    path = %config.logfile.display(),
                    "{}",
                    config.condition.idle_phrase()
                );
            }
            return Tick::Idle;
        }

        info!(
            path = %config.logfile.display(),
            command = %config.command,
            "{}; executing command",
            config.condition.triggered_phrase()
        );
        match self.executor.execute(&config.command).await {
            Ok(()) => info!("command executed successfully"),
            Err(e) => error!(
                error = %e,
                command = %config.command,
                "abnormal return when executing the command"
            ),
        }
        state.triggers += 1;
        Tick::Triggered
    }
}

fn finish(state: LoopState, outcome: Outcome) -> RunReport {
    RunReport {
        outcome,
        ticks: state.ticks,
        triggers: state.triggers,
        elapsed: state.elapsed,
    }
}

/// Run the loop with the real parent probe and shell executor.
pub async fn watch(config: &WatchConfig) -> RunReport {
    match config.parent_pid {
        Some(pid) => {
            Watcher::new(config, LivenessGuard::new(pid), ActionRunner)
                .run()
                .await
        }
        None => Watcher::new(config, NoParent, ActionRunner).run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionError;
    use crate::condition::Condition;
    use std::path::{Path, PathBuf};
    use tempfile::tempdir;

    /// Probe that runs a per-tick hook (1-based tick number) and reports its result.
    struct Scripted<F> {
        tick: u32,
        hook: F,
    }

    impl<F: FnMut(u32) -> bool> ParentProbe for Scripted<F> {
        fn is_alive(&mut self) -> bool {
            self.tick += 1;
            (self.hook)(self.tick)
        }
    }

    fn scripted<F: FnMut(u32) -> bool>(hook: F) -> Scripted<F> {
        Scripted { tick: 0, hook }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        fail: Option<fn() -> ActionError>,
    }

    impl Executor for Recorder {
        async fn execute(&mut self, command: &str) -> Result<(), ActionError> {
            self.calls.push(command.to_string());
            match self.fail {
                Some(make_error) => Err(make_error()),
                None => Ok(()),
            }
        }
    }

    fn config(logfile: &Path, keywords: &[&str]) -> WatchConfig {
        WatchConfig {
            logfile: logfile.to_path_buf(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            condition: Condition::new(true, false),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
            check_once: false,
            check_at_start: true,
            stay: false,
            verbose: true,
            foreground: true,
            command: "notify".to_string(),
            ignore_token: "<LOGWATCHER-ignore>".to_string(),
            parent_pid: Some(1),
        }
    }

    fn log_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        (dir, path)
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_on_found_runs_once_and_stops() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "2024 ERROR disk full\n").unwrap();
        let cfg = config(&path, &["ERROR"]);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Triggered));
        assert_eq!(report.exit_code(), 0);
        assert_eq!(report.ticks, 1);
        assert_eq!(w.executor.calls, vec!["notify"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_required_partial_presence_keeps_waiting() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "ERROR seen\n").unwrap();
        let mut cfg = config(&path, &["ERROR", "WARN"]);
        cfg.condition = Condition::new(true, true);
        cfg.timeout = Duration::from_secs(30);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Expired));
        assert_eq!(report.ticks, 4);
        assert!(w.executor.calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_condition_never_met_expires_cleanly() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "service READY\n").unwrap();
        let mut cfg = config(&path, &["READY"]);
        cfg.condition = Condition::new(false, true);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Expired));
        assert_eq!(report.exit_code(), 0);
        assert!(report.elapsed > cfg.timeout);
        assert!(w.executor.calls.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_condition_fires_when_keyword_absent() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "still booting\n").unwrap();
        let mut cfg = config(&path, &["READY"]);
        cfg.condition = Condition::new(false, true);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Triggered));
        assert_eq!(w.executor.calls.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_deleted_between_ticks_aborts() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "quiet\n").unwrap();
        let cfg = config(&path, &["ERROR"]);

        let target = path.clone();
        let probe = scripted(move |tick| {
            if tick == 3 {
                std::fs::remove_file(&target).unwrap();
            }
            true
        });
        let mut w = Watcher::new(&cfg, probe, Recorder::default());
        let report = w.run().await;

        assert_eq!(report.ticks, 3);
        assert_eq!(report.exit_code(), 1);
        match &report.outcome {
            Outcome::Aborted(reason @ AbortReason::FileUnavailable(_)) => {
                assert!(reason.to_string().contains("does not exist"));
                assert!(!reason.to_string().contains("parent"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dead_parent_aborts_before_any_scan() {
        // The file is missing too: a scan would have reported FileUnavailable.
        let (_dir, path) = log_path();
        let cfg = config(&path, &["ERROR"]);

        let mut w = Watcher::new(&cfg, scripted(|_| false), Recorder::default());
        let report = w.run().await;

        assert_eq!(report.ticks, 1);
        assert_eq!(report.exit_code(), 1);
        match &report.outcome {
            Outcome::Aborted(reason @ AbortReason::ParentDead { pid: Some(1) }) => {
                assert!(reason.to_string().contains("PPID=1"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stay_mode_fires_on_each_reappearance() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "").unwrap();
        let mut cfg = config(&path, &["ALERT"]);
        cfg.stay = true;

        let target = path.clone();
        let probe = scripted(move |tick| {
            let body = if tick == 2 || tick == 5 { "ALERT\n" } else { "calm\n" };
            std::fs::write(&target, body).unwrap();
            true
        });
        let mut w = Watcher::new(&cfg, probe, Recorder::default());
        let report = w.run().await;

        assert_eq!(w.executor.calls.len(), 2);
        assert_eq!(report.triggers, 2);
        assert!(matches!(report.outcome, Outcome::Triggered));
        // Ticks at 0, 10, ..., 60 seconds.
        assert_eq!(report.ticks, 7);
        assert!(report.elapsed > cfg.timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_does_not_stop_loop() {
        let failures: [fn() -> ActionError; 2] = [
            || ActionError::Failed { code: Some(1) },
            || ActionError::Spawn {
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
        ];
        for make_error in failures {
            let (_dir, path) = log_path();
            std::fs::write(&path, "ERROR\n").unwrap();
            let mut cfg = config(&path, &["ERROR"]);
            cfg.stay = true;
            cfg.timeout = Duration::from_secs(20);

            let recorder = Recorder {
                fail: Some(make_error),
                ..Default::default()
            };
            let mut w = Watcher::new(&cfg, scripted(|_| true), recorder);
            let report = w.run().await;

            assert_eq!(w.executor.calls.len(), 3, "{}", make_error());
            assert_eq!(report.triggers, 3);
            assert_eq!(report.exit_code(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_command_without_stay_still_terminates_triggered() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "ERROR\n").unwrap();
        let cfg = config(&path, &["ERROR"]);

        let recorder = Recorder {
            fail: Some(|| ActionError::Spawn {
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }),
            ..Default::default()
        };
        let mut w = Watcher::new(&cfg, scripted(|_| true), recorder);
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Triggered));
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_first_check_starts_one_interval_in() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "ERROR\n").unwrap();
        let mut cfg = config(&path, &["ERROR"]);
        cfg.check_at_start = false;

        let start = tokio::time::Instant::now();
        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert_eq!(start.elapsed(), cfg.interval);
        assert_eq!(report.elapsed, cfg.interval);
        assert_eq!(report.ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_file_created_after_start_is_fine() {
        let (_dir, path) = log_path();
        let mut cfg = config(&path, &["ERROR"]);
        cfg.check_at_start = false;

        // The file appears during the initial delay.
        let target = path.clone();
        let probe = scripted(move |tick| {
            if tick == 1 {
                std::fs::write(&target, "ERROR late\n").unwrap();
            }
            true
        });
        let mut w = Watcher::new(&cfg, probe, Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Triggered));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignored_lines_do_not_trigger() {
        let (_dir, path) = log_path();
        std::fs::write(&path, "LOGWATCHER:: watching ERROR <LOGWATCHER-ignore>\n").unwrap();
        let mut cfg = config(&path, &["ERROR"]);
        cfg.timeout = Duration::from_secs(10);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        let report = w.run().await;

        assert!(matches!(report.outcome, Outcome::Expired));
        assert!(w.executor.calls.is_empty());
    }

    async fn single_shot(check_at_start: bool) -> RunReport {
        let (_dir, path) = log_path();
        std::fs::write(&path, "quiet\n").unwrap();
        let mut cfg = config(&path, &["ERROR"]);
        cfg.check_once = true;
        cfg.check_at_start = check_at_start;
        cfg.timeout = crate::config::single_shot_timeout(cfg.interval, check_at_start);

        let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
        w.run().await
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_shot_runs_exactly_one_tick() {
        for check_at_start in [true, false] {
            let report = single_shot(check_at_start).await;
            assert_eq!(report.ticks, 1, "check_at_start={check_at_start}");
            assert!(matches!(report.outcome, Outcome::Expired));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_count_bounded_by_timeout_over_interval() {
        for (interval, timeout) in [(10, 60), (7, 60), (60, 60), (25, 10)] {
            let (_dir, path) = log_path();
            std::fs::write(&path, "quiet\n").unwrap();
            let mut cfg = config(&path, &["ERROR"]);
            cfg.interval = Duration::from_secs(interval);
            cfg.timeout = Duration::from_secs(timeout);

            let mut w = Watcher::new(&cfg, scripted(|_| true), Recorder::default());
            let report = w.run().await;

            let bound = (timeout / interval) as u32 + 1;
            assert_eq!(report.ticks, bound, "interval={interval} timeout={timeout}");
            assert_eq!(
                report.elapsed,
                Duration::from_secs(interval * u64::from(report.ticks))
            );
        }
    }
}
