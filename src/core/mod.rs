pub mod digest;
pub mod error;
pub mod filter;
mod rate;
pub mod reader;
pub mod remove;
pub mod session;
pub mod walker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub use digest::digest_file;
pub use error::{CoreError, InvalidRequest};
pub use filter::{FilterStep, MetadataFilter};
pub use reader::{read_chunks, ChunkedReader, DEFAULT_CHUNK_SIZE};
pub use remove::{FileRemover, FsRemover};
pub use session::{start_scan, start_scan_with, CancelHandle, SessionHandle, SessionOptions};
pub use walker::{PathWalker, RawFile, WalkEntry};

/// A file that met the size threshold when it was measured.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified_at: DateTime<Utc>,
}

/// Parameters of a single scan invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    root_path: PathBuf,
    threshold_bytes: u64,
    include_hidden: bool,
}

impl ScanRequest {
    /// Builds a request from a signed threshold, rejecting negative values.
    pub fn new(
        root_path: impl Into<PathBuf>,
        threshold_bytes: i64,
        include_hidden: bool,
    ) -> Result<Self, InvalidRequest> {
        let threshold_bytes = u64::try_from(threshold_bytes)
            .map_err(|_| InvalidRequest::NegativeThreshold(threshold_bytes))?;
        Ok(Self::at_least(root_path, threshold_bytes, include_hidden))
    }

    pub fn at_least(
        root_path: impl Into<PathBuf>,
        threshold_bytes: u64,
        include_hidden: bool,
    ) -> Self {
        Self {
            root_path: root_path.into(),
            threshold_bytes,
            include_hidden,
        }
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn threshold_bytes(&self) -> u64 {
        self.threshold_bytes
    }

    pub fn include_hidden(&self) -> bool {
        self.include_hidden
    }

    pub(crate) fn with_root(self, root_path: PathBuf) -> Self {
        Self { root_path, ..self }
    }
}

/// Classification of a recoverable, per-entry traversal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryErrorKind {
    PermissionDenied,
    NotFound,
    BrokenSymlink,
    Other,
}

/// A single entry the walk had to skip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    pub path: PathBuf,
    pub kind: EntryErrorKind,
    pub message: String,
}

impl EntryError {
    pub fn new(path: impl Into<PathBuf>, kind: EntryErrorKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn from_io(path: impl Into<PathBuf>, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::PermissionDenied => EntryErrorKind::PermissionDenied,
            io::ErrorKind::NotFound => EntryErrorKind::NotFound,
            _ => EntryErrorKind::Other,
        };
        Self::new(path, kind, err.to_string())
    }
}

/// Running counters of a scan session.
///
/// Only the session worker mutates this; consumers receive clones, either as
/// [`ScanEvent::Progress`] or through [`SessionHandle::progress`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    pub entries_visited: u64,
    pub qualifying_found: u64,
    pub current_path: String,
    /// Total number of skipped entries, including those evicted from `recent_errors`.
    pub entry_errors: u64,
    /// The most recent entry errors, oldest first.
    pub recent_errors: VecDeque<EntryError>,
    /// Wall-clock start of the worker; `None` until it runs.
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    /// Visit rate, smoothed over successive progress updates.
    pub entries_per_sec: f64,
    /// Entry count from the counting pass, when one was requested.
    pub total_entries: Option<u64>,
}

impl ScanProgress {
    pub(crate) fn record_visit(&mut self, path: &Path) {
        self.entries_visited += 1;
        if !path.as_os_str().is_empty() {
            self.current_path = path.display().to_string();
        }
    }

    /// Share of the counted entries visited so far, in percent.
    pub fn percent(&self) -> Option<f64> {
        let total = self.total_entries?;
        if total == 0 {
            return Some(100.0);
        }
        Some((self.entries_visited as f64 / total as f64 * 100.0).min(100.0))
    }

    /// Estimated time left, from the smoothed rate or else the average one.
    pub fn eta(&self) -> Option<Duration> {
        let remaining = self.total_entries?.saturating_sub(self.entries_visited);
        let rate = if self.entries_per_sec > f64::EPSILON {
            self.entries_per_sec
        } else if self.elapsed_ms > 0 {
            self.entries_visited as f64 * 1000.0 / self.elapsed_ms as f64
        } else {
            0.0
        };
        if rate <= f64::EPSILON {
            return None;
        }
        Some(Duration::from_secs_f64(remaining as f64 / rate))
    }

    pub(crate) fn record_error(&mut self, error: EntryError, keep: usize) {
        self.entry_errors += 1;
        if keep == 0 {
            return;
        }
        while self.recent_errors.len() >= keep {
            self.recent_errors.pop_front();
        }
        self.recent_errors.push_back(error);
    }
}

/// Terminal state of a scan session, produced exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    /// The walk was exhausted; `entry_errors` entries were skipped on the way.
    Completed {
        total_qualifying: u64,
        entry_errors: u64,
    },
    Cancelled {
        qualifying_found: u64,
    },
    /// The scan could not run at all.
    Failed {
        cause: String,
    },
}

/// Everything a consumer can pull from a session, in production order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScanEvent {
    File(FileDescriptor),
    Progress(ScanProgress),
    Finished(ScanOutcome),
}

/// Lifecycle of a session: `Idle -> Running -> {Completed, Cancelled, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Running = 1,
    Completed = 2,
    Cancelled = 3,
    Failed = 4,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Idle,
            1 => SessionState::Running,
            2 => SessionState::Completed,
            3 => SessionState::Cancelled,
            _ => SessionState::Failed,
        }
    }
}

impl From<&ScanOutcome> for SessionState {
    fn from(outcome: &ScanOutcome) -> Self {
        match outcome {
            ScanOutcome::Completed { .. } => SessionState::Completed,
            ScanOutcome::Cancelled { .. } => SessionState::Cancelled,
            ScanOutcome::Failed { .. } => SessionState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_threshold_is_rejected() {
        let err = ScanRequest::new("/tmp", -1, false).unwrap_err();
        assert_eq!(err, InvalidRequest::NegativeThreshold(-1));
    }

    #[test]
    fn test_zero_threshold_is_accepted() {
        let request = ScanRequest::new("/tmp", 0, true).unwrap();
        assert_eq!(request.threshold_bytes(), 0);
        assert!(request.include_hidden());
    }

    #[test]
    fn test_recent_errors_are_bounded_but_counted() {
        let mut progress = ScanProgress::default();
        for i in 0..5 {
            progress.record_error(
                EntryError::new(format!("/x/{i}"), EntryErrorKind::Other, "boom"),
                3,
            );
        }
        assert_eq!(progress.entry_errors, 5);
        let kept: Vec<_> = progress
            .recent_errors
            .iter()
            .map(|e| e.path.clone())
            .collect();
        assert_eq!(
            kept,
            vec![
                PathBuf::from("/x/2"),
                PathBuf::from("/x/3"),
                PathBuf::from("/x/4")
            ]
        );
    }

    #[test]
    fn test_visit_without_a_path_keeps_the_current_path() {
        let mut progress = ScanProgress::default();
        progress.record_visit(Path::new("/root/dir"));
        progress.record_visit(Path::new(""));

        assert_eq!(progress.entries_visited, 2);
        assert_eq!(progress.current_path, "/root/dir");
    }

    #[test]
    fn test_percent_and_eta_need_a_counted_total() {
        let mut progress = ScanProgress {
            entries_visited: 25,
            elapsed_ms: 5_000,
            ..ScanProgress::default()
        };
        assert_eq!(progress.percent(), None);
        assert_eq!(progress.eta(), None);

        progress.total_entries = Some(100);
        progress.entries_per_sec = 15.0;
        assert_eq!(progress.percent(), Some(25.0));
        assert_eq!(progress.eta(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_eta_falls_back_to_the_average_rate() {
        let progress = ScanProgress {
            entries_visited: 50,
            elapsed_ms: 10_000,
            total_entries: Some(80),
            ..ScanProgress::default()
        };

        assert_eq!(progress.eta(), Some(Duration::from_secs(6)));
    }

    #[test]
    fn test_percent_is_capped_when_the_tree_grew() {
        let progress = ScanProgress {
            entries_visited: 12,
            total_entries: Some(10),
            ..ScanProgress::default()
        };
        let empty = ScanProgress {
            total_entries: Some(0),
            ..ScanProgress::default()
        };

        assert_eq!(progress.percent(), Some(100.0));
        assert_eq!(empty.percent(), Some(100.0));
        assert_eq!(progress.eta(), None);
    }

    #[test]
    fn test_io_error_kinds_map_to_entry_kinds() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(
            EntryError::from_io("/a", &denied).kind,
            EntryErrorKind::PermissionDenied
        );
        assert_eq!(EntryError::from_io("/b", &missing).kind, EntryErrorKind::NotFound);
    }

    #[test]
    fn test_session_state_round_trips_through_u8() {
        for state in [
            SessionState::Idle,
            SessionState::Running,
            SessionState::Completed,
            SessionState::Cancelled,
            SessionState::Failed,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
        assert!(!SessionState::Running.is_terminal());
        assert!(SessionState::Failed.is_terminal());
    }
}
