//! Lazy directory traversal that never aborts on a single bad entry.

use ignore::{Walk, WalkBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{EntryError, EntryErrorKind};

/// Size and modification time of a regular file, as reported by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// One step of the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEntry {
    /// A regular file, or a symlink resolving to one.
    File(RawFile),
    Directory(PathBuf),
    /// Anything that is neither descended into nor measured: symlinks to
    /// directories, sockets, fifos, devices.
    Skipped(PathBuf),
    Error(EntryError),
}

/// Depth-first walk over a directory tree.
///
/// Directory symlinks are reported as [`WalkEntry::Skipped`] and never
/// followed, so the walk cannot cycle. A fresh walker must be created to
/// traverse the tree again.
pub struct PathWalker {
    inner: Walk,
    last_path: Option<PathBuf>,
}

impl PathWalker {
    pub fn new(root: &Path, include_hidden: bool) -> Self {
        // Report everything, .gitignore and .ignore rules included.
        let inner = WalkBuilder::new(root)
            .standard_filters(false)
            .hidden(!include_hidden)
            .follow_links(false)
            .build();
        Self {
            inner,
            last_path: None,
        }
    }
}

impl Iterator for PathWalker {
    type Item = WalkEntry;

    fn next(&mut self) -> Option<WalkEntry> {
        let entry = match self.inner.next()? {
            Ok(entry) => classify(entry),
            // Pathless errors are attributed to the entry reported just before.
            Err(err) => WalkEntry::Error(entry_error(&err, self.last_path.as_deref())),
        };
        if let Some(path) = entry_path(&entry) {
            if !path.as_os_str().is_empty() {
                self.last_path = Some(path.to_path_buf());
            }
        }
        Some(entry)
    }
}

fn classify(entry: ignore::DirEntry) -> WalkEntry {
    let Some(file_type) = entry.file_type() else {
        return WalkEntry::Skipped(entry.into_path());
    };

    if file_type.is_dir() {
        return WalkEntry::Directory(entry.into_path());
    }

    if file_type.is_symlink() {
        let path = entry.into_path();
        return match fs::metadata(&path) {
            Ok(target) if target.is_file() => WalkEntry::File(RawFile {
                size: target.len(),
                modified: target.modified().ok(),
                path,
            }),
            Ok(_) => WalkEntry::Skipped(path),
            Err(err) => WalkEntry::Error(EntryError::new(
                path,
                EntryErrorKind::BrokenSymlink,
                err.to_string(),
            )),
        };
    }

    if !file_type.is_file() {
        return WalkEntry::Skipped(entry.into_path());
    }

    match entry.metadata() {
        Ok(metadata) => WalkEntry::File(RawFile {
            size: metadata.len(),
            modified: metadata.modified().ok(),
            path: entry.into_path(),
        }),
        Err(err) => WalkEntry::Error(entry_error(&err, Some(entry.path()))),
    }
}

fn entry_path(entry: &WalkEntry) -> Option<&Path> {
    match entry {
        WalkEntry::File(raw) => Some(&raw.path),
        WalkEntry::Directory(path) | WalkEntry::Skipped(path) => Some(path),
        WalkEntry::Error(error) => Some(&error.path),
    }
}

fn entry_error(err: &ignore::Error, fallback: Option<&Path>) -> EntryError {
    let path = error_path(err)
        .or_else(|| fallback.map(Path::to_path_buf))
        .unwrap_or_default();
    match err.io_error() {
        Some(io) => EntryError::from_io(path, io),
        None => EntryError::new(path, EntryErrorKind::Other, err.to_string()),
    }
}

fn error_path(err: &ignore::Error) -> Option<PathBuf> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.clone()),
        ignore::Error::WithDepth { err, .. } | ignore::Error::WithLineNumber { err, .. } => {
            error_path(err)
        }
        ignore::Error::Loop { child, .. } => Some(child.clone()),
        ignore::Error::Partial(errs) => errs.first().and_then(error_path),
        _ => None,
    }
}
