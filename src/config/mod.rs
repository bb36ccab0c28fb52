pub mod settings;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::session::{
    SessionOptions, DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_RECORDED_ERRORS,
    PROGRESS_UPDATE_INTERVAL,
};
use crate::core::DEFAULT_CHUNK_SIZE;
use crate::utils::format::mib_to_bytes;

/// Persisted user preferences. Missing fields fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub last_directory: Option<PathBuf>,
    pub min_size_mb: u64,
    pub include_hidden: bool,
    pub chunk_size: usize,
    pub channel_capacity: usize,
    pub progress_interval: u64,
    pub max_recorded_errors: usize,
    /// Count entries before scanning so progress can show a percentage.
    pub count_entries_first: bool,
}

impl AppConfig {
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        settings::load_config(dir)
    }

    pub fn threshold_bytes(&self) -> u64 {
        mib_to_bytes(self.min_size_mb)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            channel_capacity: self.channel_capacity.max(1),
            progress_interval: self.progress_interval.max(1),
            max_recorded_errors: self.max_recorded_errors,
            count_entries: self.count_entries_first,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            last_directory: None,
            min_size_mb: 50,
            include_hidden: false,
            chunk_size: DEFAULT_CHUNK_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            max_recorded_errors: DEFAULT_MAX_RECORDED_ERRORS,
            count_entries_first: false,
        }
    }
}
