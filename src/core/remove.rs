//! The deletion interface used by consumers of scan results.
//!
//! The scanner itself never calls this.

use std::fs;
use std::path::Path;

use super::CoreError;

pub trait FileRemover: Send + Sync {
    fn remove(&self, path: &Path) -> Result<(), CoreError>;
}

/// Permanently unlinks files. Directories are refused by the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove(&self, path: &Path) -> Result<(), CoreError> {
        fs::remove_file(path).map_err(|e| CoreError::Io(e, path.to_path_buf()))?;
        tracing::info!("Removed {}", path.display());
        Ok(())
    }
}
