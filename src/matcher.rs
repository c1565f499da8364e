/// Keyword scanning: one full pass over the watched file per tick.
///
/// There is no persisted offset. Every call rereads the file from the
/// beginning, so "found" means "present anywhere in the current content".
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One slot per configured keyword, `true` when the keyword was seen on a
/// line that does not carry the ignore token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceVector(Vec<bool>);

impl PresenceVector {
    /// All-false vector of the given length.
    pub fn new(len: usize) -> Self {
        Self(vec![false; len])
    }

    pub fn slots(&self) -> &[bool] {
        &self.0
    }

    fn mark(&mut self, index: usize) {
        self.0[index] = true;
    }
}

impl From<Vec<bool>> for PresenceVector {
    fn from(slots: Vec<bool>) -> Self {
        Self(slots)
    }
}

/// Errors raised while scanning the watched file.
#[derive(Debug)]
pub enum MatchError {
    /// The file could not be opened for reading at check time.
    FileUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The file opened but reading it failed part way.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl std::fmt::Display for MatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchError::FileUnavailable { path, source }
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                write!(f, "the file {} does not exist: {}", path.display(), source)
            }
            MatchError::FileUnavailable { path, source } => {
                write!(f, "the file {} cannot be opened: {}", path.display(), source)
            }
            MatchError::Read { path, source } => {
                write!(f, "failed to read {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for MatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MatchError::FileUnavailable { source, .. } => Some(source),
            MatchError::Read { source, .. } => Some(source),
        }
    }
}

/// Plain substring matcher over a fixed keyword list.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keywords: Vec<String>,
    ignore_token: String,
}

impl KeywordMatcher {
    pub fn new(keywords: Vec<String>, ignore_token: impl Into<String>) -> Self {
        Self {
            keywords,
            ignore_token: ignore_token.into(),
        }
    }

    /// Scan `path` from the start and report which keywords are present.
    pub fn scan(&self, path: &Path) -> Result<PresenceVector, MatchError> {
        let file = File::open(path).map_err(|e| MatchError::FileUnavailable {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut reader = BufReader::new(file);
        let mut presence = PresenceVector::new(self.keywords.len());

        // Lines are read as bytes so a stray non-UTF-8 sequence in a log
        // does not abort the pass.
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader
                .read_until(b'\n', &mut buf)
                .map_err(|e| MatchError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })?;
            if n == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            self.scan_line(&line, &mut presence);
        }

        Ok(presence)
    }

    /// Mark every keyword contained in `line` unless the line carries the ignore token.
    fn scan_line(&self, line: &str, presence: &mut PresenceVector) {
        if line.contains(self.ignore_token.as_str()) {
            return;
        }
        for (index, keyword) in self.keywords.iter().enumerate() {
            if line.contains(keyword.as_str()) {
                presence.mark(index);
            }
        }
    }
}
