// Declare all modules as public so they can be used by the binary and tests.
pub mod config;
pub mod core;
pub mod utils;

pub use crate::core::{
    digest_file, read_chunks, start_scan, start_scan_with, CancelHandle, ChunkedReader, CoreError,
    EntryError, EntryErrorKind, FileDescriptor, FileRemover, FsRemover, InvalidRequest,
    ScanEvent, ScanOutcome, ScanProgress, ScanRequest, SessionHandle, SessionOptions,
    SessionState,
};
