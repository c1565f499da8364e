/// Process-wide identity of the running watcher.
///
/// Derived once from `argv[0]` and threaded into every component that needs
/// it (matcher, config validation, log messages).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramIdentity {
    /// Executable basename, e.g. `logwatcher`.
    pub name: String,
    /// ASCII upper-case form of `name`.
    pub upper_name: String,
    /// Marker that suppresses keyword matching on the line that carries it.
    pub ignore_token: String,
}

const FALLBACK_NAME: &str = "logwatcher";

impl ProgramIdentity {
    /// Build the identity from a program name or path (only the basename is kept).
    pub fn new(argv0: &str) -> Self {
        let name = argv0
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_NAME)
            .to_string();
        let upper_name = name.to_ascii_uppercase();
        let ignore_token = format!("<{upper_name}-ignore>");
        Self {
            name,
            upper_name,
            ignore_token,
        }
    }

    /// Identity of the current process, from `std::env::args`.
    pub fn from_env() -> Self {
        match std::env::args().next() {
            Some(argv0) => Self::new(&argv0),
            None => Self::new(FALLBACK_NAME),
        }
    }
}
