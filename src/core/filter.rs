//! Size threshold applied on top of the raw walk.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::walker::{RawFile, WalkEntry};
use super::{EntryError, FileDescriptor};

/// Result of filtering one walk entry. Exactly one step is produced per
/// entry, so callers can treat every step as an entry boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterStep {
    Qualifying(FileDescriptor),
    BelowThreshold(PathBuf),
    /// Directories and other entries that are never measured.
    NotAFile(PathBuf),
    Failed(EntryError),
}

impl FilterStep {
    pub fn path(&self) -> &Path {
        match self {
            FilterStep::Qualifying(file) => &file.path,
            FilterStep::BelowThreshold(path) | FilterStep::NotAFile(path) => path,
            FilterStep::Failed(error) => &error.path,
        }
    }
}

/// `true` when a file of `size` bytes is reported under `threshold`.
pub fn qualifies(size: u64, threshold: u64) -> bool {
    size >= threshold
}

pub struct MetadataFilter<I> {
    entries: I,
    threshold_bytes: u64,
}

impl<I> MetadataFilter<I>
where
    I: Iterator<Item = WalkEntry>,
{
    pub fn new(entries: I, threshold_bytes: u64) -> Self {
        Self {
            entries,
            threshold_bytes,
        }
    }

    fn apply(&self, entry: WalkEntry) -> FilterStep {
        match entry {
            WalkEntry::File(raw) if qualifies(raw.size, self.threshold_bytes) => {
                FilterStep::Qualifying(describe(raw))
            }
            WalkEntry::File(raw) => FilterStep::BelowThreshold(raw.path),
            WalkEntry::Directory(path) | WalkEntry::Skipped(path) => FilterStep::NotAFile(path),
            WalkEntry::Error(error) => FilterStep::Failed(error),
        }
    }
}

impl<I> Iterator for MetadataFilter<I>
where
    I: Iterator<Item = WalkEntry>,
{
    type Item = FilterStep;

    fn next(&mut self) -> Option<FilterStep> {
        let entry = self.entries.next()?;
        Some(self.apply(entry))
    }
}

// The timestamp is only converted once a file is known to qualify.
fn describe(raw: RawFile) -> FileDescriptor {
    let modified_at: DateTime<Utc> = raw.modified.unwrap_or(UNIX_EPOCH).into();
    FileDescriptor {
        path: raw.path,
        size_bytes: raw.size,
        modified_at,
    }
}
