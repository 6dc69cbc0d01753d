//! Availability-gated file body.
//!
//! The body is read in fixed-size chunks from a handle owned by the request.
//! Before each chunk is read the binding is asked whether those bytes are on
//! disk; a chunk that never arrives ends the body with an error, which
//! aborts the connection instead of sending bytes the engine has not
//! written yet.

use std::io::SeekFrom;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use bytes::Bytes;
use reelway_core::session::{ByteRange, FileBinding};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

use crate::handlers::StreamError;

/// Opens a fresh read handle positioned at `offset`.
///
/// # Errors
/// - `std::io::Error` - The bound file could not be opened or seeked
pub async fn open_at(binding: &FileBinding, offset: u64) -> Result<File, std::io::Error> {
    let mut file = File::open(&binding.path).await?;
    file.seek(SeekFrom::Start(offset)).await?;
    Ok(file)
}

/// Sequential reader over one requested range.
pub struct GatedReader {
    binding: Arc<FileBinding>,
    file: File,
    position: u64,
    end: u64,
    chunk_size: u64,
    timeout: Duration,
}

impl GatedReader {
    /// `file` must already be positioned at `range.start`.
    pub fn new(
        binding: Arc<FileBinding>,
        file: File,
        range: ByteRange,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            binding,
            file,
            position: range.start,
            end: range.end,
            chunk_size: chunk_size.max(1) as u64,
            timeout,
        }
    }

    /// Range of the next chunk, or `None` once the range is exhausted.
    pub fn next_chunk_range(&self) -> Option<ByteRange> {
        (self.position <= self.end).then(|| {
            let chunk_end = self
                .position
                .saturating_add(self.chunk_size - 1)
                .min(self.end);
            ByteRange::new(self.position, chunk_end)
        })
    }

    /// Waits for and reads the next chunk.
    ///
    /// # Errors
    /// - `StreamError::Unavailable` - The chunk did not arrive in time or the session stopped
    /// - `StreamError::Io` - Reading the bound file failed
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>, StreamError> {
        let Some(chunk) = self.next_chunk_range() else {
            return Ok(None);
        };

        self.binding.wait_for_range(chunk, self.timeout).await?;

        let mut buffer = vec![0u8; chunk.len() as usize];
        self.file.read_exact(&mut buffer).await?;
        self.position = chunk.end + 1;

        Ok(Some(Bytes::from(buffer)))
    }

    /// Turns the reader into a streaming response body.
    pub fn into_body(self) -> Body {
        let stream = futures::stream::try_unfold(self, |mut reader| async move {
            match reader.next_chunk().await {
                Ok(Some(bytes)) => Ok(Some((bytes, reader))),
                Ok(None) => {
                    debug!("Finished streaming {}", reader.binding.path.display());
                    Ok(None)
                }
                Err(e) => {
                    warn!(
                        "Aborting body of {} at byte {}: {}",
                        reader.binding.path.display(),
                        reader.position,
                        e
                    );
                    Err(e)
                }
            }
        });
        Body::from_stream(stream)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use reelway_core::session::{AvailabilityError, AvailabilityWatch, PriorityRequester};
    use tempfile::NamedTempFile;

    use super::*;

    fn temp_file(data: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_range_in_chunks() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let file = temp_file(&data);
        let binding = Arc::new(FileBinding::complete(file.path().to_path_buf(), 5000));
        let handle = open_at(&binding, 100).await.unwrap();
        let mut reader = GatedReader::new(
            binding,
            handle,
            ByteRange::new(100, 2599),
            1024,
            Duration::from_millis(100),
        );

        let mut collected = Vec::new();
        let mut chunks = 0;
        while let Some(bytes) = reader.next_chunk().await.unwrap() {
            assert!(bytes.len() <= 1024);
            collected.extend_from_slice(&bytes);
            chunks += 1;
        }

        assert_eq!(chunks, 3);
        assert_eq!(collected, &data[100..2600]);
    }

    #[tokio::test]
    async fn test_missing_chunk_times_out() {
        let file = temp_file(&[7u8; 4096]);
        let (sender, availability) = AvailabilityWatch::channel(4096);
        sender.send_modify(|a| a.contiguous_bytes = 1024);
        let binding = Arc::new(FileBinding {
            path: file.path().to_path_buf(),
            total_size: 4096,
            availability,
            priorities: PriorityRequester::none(),
        });
        let handle = open_at(&binding, 0).await.unwrap();
        let mut reader = GatedReader::new(
            binding,
            handle,
            ByteRange::new(0, 4095),
            1024,
            Duration::from_millis(50),
        );

        assert_eq!(reader.next_chunk().await.unwrap().unwrap().len(), 1024);
        let err = reader.next_chunk().await.unwrap_err();
        assert!(matches!(
            err,
            StreamError::Unavailable(AvailabilityError::Timeout { .. })
        ));
    }
}
