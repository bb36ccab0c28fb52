use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ChunkedReader, CoreError};

/// Computes the hex SHA-256 of a file's content through [`ChunkedReader`].
///
/// Returns `Ok(None)` if `cancel` is set between two chunks; the file handle
/// is released before returning.
pub fn digest_file(
    path: &Path,
    chunk_size: usize,
    cancel: &AtomicBool,
) -> Result<Option<String>, CoreError> {
    let mut reader = ChunkedReader::open(path, chunk_size)?;
    let mut hasher = Sha256::new();

    loop {
        if cancel.load(Ordering::Relaxed) {
            tracing::debug!(
                "Digest of {} cancelled after {} bytes",
                path.display(),
                reader.bytes_read()
            );
            reader.close();
            return Ok(None);
        }
        match reader.next_chunk()? {
            Some(chunk) => hasher.update(&chunk),
            None => break,
        }
    }

    Ok(Some(format!("{:x}", hasher.finalize())))
}
