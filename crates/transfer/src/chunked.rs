use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncReadExt;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Reads a local file in fixed-size chunks.
///
/// The file handle is owned by the reader and released when it is dropped.
pub struct ChunkReader {
    file: tokio::fs::File,
    chunk_size: usize,
    offset: u64,
    path: PathBuf,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub async fn open(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| TransferError::local(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| TransferError::local(path, e))?;
        if metadata.is_dir() {
            return Err(TransferError::local(
                path,
                std::io::Error::other("is a directory"),
            ));
        }
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            path: path.to_path_buf(),
            file_size: metadata.len(),
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        let mut filled = 0;
        while filled < read_size {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(|e| TransferError::local(&self.path, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            // Truncated underneath us; the declared length can no longer be met.
            return Err(TransferError::local(
                &self.path,
                std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "file shrank while reading"),
            ));
        }
        buf.truncate(filled);
        self.offset += filled as u64;
        Ok(Some(Bytes::from(buf)))
    }

    /// Total file size in bytes, as of opening.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_all_chunks() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"AABB");
        assert_eq!(reader.remaining(), 6);
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"CCDD");
        assert_eq!(&reader.next_chunk().await.unwrap().unwrap()[..], b"EE");
        assert_eq!(reader.remaining(), 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_file_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "empty.bin", b"");
        let mut reader = ChunkReader::open(&path, 4).await.unwrap();
        assert_eq!(reader.file_size(), 0);
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_chunk_size_uses_default() {
        let dir = TempDir::new().unwrap();
        let data = vec![7u8; 1000];
        let path = create_test_file(dir.path(), "small.bin", &data);
        let mut reader = ChunkReader::open(&path, 0).await.unwrap();
        // Smaller than the default chunk, so one read returns everything.
        assert_eq!(reader.next_chunk().await.unwrap().unwrap().len(), 1000);
    }

    #[tokio::test]
    async fn missing_file_is_local_error() {
        let dir = TempDir::new().unwrap();
        let result = ChunkReader::open(&dir.path().join("missing.bin"), 4).await;
        assert!(matches!(result, Err(TransferError::LocalFile { .. })));
    }

    #[tokio::test]
    async fn directory_is_rejected() {
        let dir = TempDir::new().unwrap();
        let result = ChunkReader::open(dir.path(), 4).await;
        assert!(matches!(result, Err(TransferError::LocalFile { .. })));
    }
}
