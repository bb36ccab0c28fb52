//! Sequential, bounded-size reads of file content.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use super::{CoreError, InvalidRequest};

pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Reads a file front to back, at most `chunk_size` bytes at a time.
///
/// The handle is released at end of stream, on the first error, on
/// [`ChunkedReader::close`], or on drop. After any of those, every further
/// call reports end of stream.
#[derive(Debug)]
pub struct ChunkedReader {
    path: PathBuf,
    file: Option<File>,
    chunk_size: usize,
    bytes_read: u64,
}

impl ChunkedReader {
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, CoreError> {
        if chunk_size == 0 {
            return Err(InvalidRequest::ZeroChunkSize.into());
        }
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|source| CoreError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            file: Some(file),
            chunk_size,
            bytes_read: 0,
        })
    }

    /// Returns the next chunk, or `Ok(None)` once the file is exhausted.
    ///
    /// Only the final chunk may be shorter than the chunk size.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, CoreError> {
        if self.file.is_none() {
            return Ok(None);
        }

        // An open handle keeps unlinked data readable on unix; treat removal as a failure.
        // Links are followed, so removing the target of a symlinked path counts too.
        if let Err(source) = fs::metadata(&self.path) {
            return Err(self.fail(source));
        }

        let mut buffer = vec![0u8; self.chunk_size];
        let filled = match self.file.as_mut() {
            Some(file) => fill(file, &mut buffer),
            None => return Ok(None),
        };

        match filled {
            Ok(0) => {
                self.close();
                Ok(None)
            }
            Ok(n) => {
                buffer.truncate(n);
                self.bytes_read += n as u64;
                Ok(Some(buffer))
            }
            Err(source) => Err(self.fail(source)),
        }
    }

    pub fn close(&mut self) {
        self.file = None;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn fail(&mut self, source: io::Error) -> CoreError {
        tracing::warn!("Chunked read of {} failed: {}", self.path.display(), source);
        self.close();
        CoreError::Read {
            path: self.path.clone(),
            source,
        }
    }
}

impl Iterator for ChunkedReader {
    type Item = Result<Vec<u8>, CoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk().transpose()
    }
}

/// Opens `path` for chunked reading; independent of any scan session.
pub fn read_chunks(
    path: impl AsRef<Path>,
    chunk_size: usize,
) -> Result<ChunkedReader, CoreError> {
    ChunkedReader::open(path, chunk_size)
}

fn fill(file: &mut File, buffer: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match file.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    #[test]
    fn test_chunks_cover_the_file_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let content: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        fs::write(&path, &content).unwrap();

        let chunks: Vec<Vec<u8>> = read_chunks(&path, 300)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let sizes: Vec<usize> = chunks.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![300, 300, 300, 100]);
        assert_eq!(chunks.concat(), content);
    }

    #[test]
    fn test_end_of_stream_is_sticky_and_releases_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("small.txt");
        fs::write(&path, b"abc").unwrap();

        let mut reader = ChunkedReader::open(&path, DEFAULT_CHUNK_SIZE).unwrap();
        assert_eq!(reader.next_chunk().unwrap(), Some(b"abc".to_vec()));
        assert_eq!(reader.next_chunk().unwrap(), None);
        assert!(!reader.is_open());
        assert_eq!(reader.next_chunk().unwrap(), None);
        assert_eq!(reader.bytes_read(), 3);
    }

    #[test]
    fn test_empty_file_ends_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::write(&path, b"").unwrap();

        let mut reader = ChunkedReader::open(&path, 16).unwrap();
        assert_eq!(reader.next_chunk().unwrap(), None);
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"x").unwrap();

        let err = ChunkedReader::open(&path, 0).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidRequest(InvalidRequest::ZeroChunkSize)
        ));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let err = read_chunks(dir.path().join("nope"), 16).unwrap_err();
        assert!(matches!(err, CoreError::Read { .. }));
    }

    #[test]
    #[traced_test]
    fn test_removal_mid_stream_fails_but_keeps_earlier_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vanishing.bin");
        fs::write(&path, vec![7u8; 64]).unwrap();

        let mut reader = ChunkedReader::open(&path, 16).unwrap();
        let first = reader.next_chunk().unwrap().unwrap();
        fs::remove_file(&path).unwrap();

        let err = reader.next_chunk().unwrap_err();
        assert!(matches!(err, CoreError::Read { ref path, .. } if path.ends_with("vanishing.bin")));
        assert_eq!(first, vec![7u8; 16]);
        assert!(!reader.is_open());
        assert_eq!(reader.next_chunk().unwrap(), None);
        assert!(logs_contain("Chunked read of"));
    }

    #[cfg(unix)]
    #[test]
    fn test_removing_the_target_of_a_symlinked_file_fails_the_read() {
        use std::os::unix::fs::symlink;

        let dir = tempdir().unwrap();
        let target = dir.path().join("target.bin");
        let alias = dir.path().join("alias.bin");
        fs::write(&target, vec![3u8; 64]).unwrap();
        symlink(&target, &alias).unwrap();

        let mut reader = ChunkedReader::open(&alias, 16).unwrap();
        assert_eq!(reader.next_chunk().unwrap().map(|c| c.len()), Some(16));
        fs::remove_file(&target).unwrap();

        let err = reader.next_chunk().unwrap_err();
        assert!(matches!(err, CoreError::Read { ref path, .. } if path == &alias));
        assert!(!reader.is_open());
        assert_eq!(reader.bytes_read(), 16);
    }
}
