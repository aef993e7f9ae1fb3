// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    io::SeekFrom,
    path::{Path, PathBuf},
};

use bytes::Bytes;
use futures::StreamExt;
use snafu::{ResultExt, ensure};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tracing::debug;

use crate::{
    checksum::sha256_hex,
    error::{InvalidResumePointSnafu, Result, SourceReadSnafu, SourceUnavailableSnafu},
    source::ChunkStream,
    types::{Chunk, ChunkRequest, FileMetadata},
};

/// Reads the source file as an ordered sequence of checksummed chunks.
#[derive(Debug, Clone)]
pub struct ChunkStreamer {
    source_path: PathBuf,
    chunk_size:  u32,
}

impl ChunkStreamer {
    pub fn new(source_path: impl Into<PathBuf>, chunk_size: u32) -> Self {
        Self {
            source_path: source_path.into(),
            chunk_size,
        }
    }

    pub fn source_path(&self) -> &Path { &self.source_path }

    /// Opens the source and positions it at the requested chunk.
    ///
    /// The returned stream is lazy: each poll reads at most one chunk. It
    /// ends without error at end of file and yields at most one error, after
    /// which it is exhausted.
    pub async fn open(&self, request: ChunkRequest) -> Result<ChunkStream> {
        let location = self.source_path.display().to_string();
        let mut file = File::open(&self.source_path)
            .await
            .context(SourceUnavailableSnafu {
                location: location.clone(),
            })?;
        let source_len = file
            .metadata()
            .await
            .context(SourceUnavailableSnafu { location })?
            .len();
        let metadata = FileMetadata::new(source_len, self.chunk_size)?;

        let start = request.start_chunk_index;
        let offset = metadata.chunk_offset(start);
        ensure!(
            offset <= source_len,
            InvalidResumePointSnafu {
                start_chunk_index: start,
                offset,
                source_len,
            }
        );
        file.seek(SeekFrom::Start(offset))
            .await
            .context(SourceReadSnafu {
                sequence_number: start,
            })?;

        debug!(
            path = %self.source_path.display(),
            start_chunk = start,
            offset,
            total_chunks = metadata.total_chunk_count,
            "opened chunk stream"
        );

        let reader = ChunkReader {
            file,
            metadata,
            next_sequence: start,
            exhausted: false,
        };
        let stream = futures::stream::unfold(reader, |mut reader| async move {
            if reader.exhausted {
                return None;
            }
            match reader.read_next().await {
                Ok(Some(chunk)) => Some((Ok(chunk), reader)),
                Ok(None) => None,
                Err(err) => {
                    reader.exhausted = true;
                    Some((Err(err), reader))
                }
            }
        });
        Ok(stream.boxed())
    }
}

struct ChunkReader {
    file:          File,
    metadata:      FileMetadata,
    next_sequence: u32,
    exhausted:     bool,
}

impl ChunkReader {
    /// Fills one chunk buffer, looping over short reads until the chunk is
    /// full or the file ends.
    async fn read_next(&mut self) -> Result<Option<Chunk>> {
        let chunk_size = self.metadata.chunk_size;
        let mut buf = Vec::with_capacity(chunk_size as usize);
        let read = (&mut self.file)
            .take(u64::from(chunk_size))
            .read_to_end(&mut buf)
            .await
            .context(SourceReadSnafu {
                sequence_number: self.next_sequence,
            })?;
        if read == 0 {
            return Ok(None);
        }

        let checksum = sha256_hex(&buf);
        let chunk = Chunk {
            sequence_number: self.next_sequence,
            payload: Bytes::from(buf),
            checksum,
            total_size: self.metadata.total_size,
            total_chunk_count: self.metadata.total_chunk_count,
        };
        self.next_sequence += 1;
        Ok(Some(chunk))
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use tempfile::TempDir;

    use super::*;
    use crate::{TransferError, checksum::verify_checksum};

    fn source_with(dir: &TempDir, data: &[u8]) -> PathBuf {
        let path = dir.path().join("source.bin");
        std::fs::write(&path, data).unwrap();
        path
    }

    #[tokio::test]
    async fn test_streams_all_chunks_in_order() {
        let dir = TempDir::new().unwrap();
        let path = source_with(&dir, b"AABBCCDDEE");

        let streamer = ChunkStreamer::new(&path, 4);
        let chunks: Vec<Chunk> = streamer
            .open(ChunkRequest::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 3);
        let payloads: Vec<&[u8]> = chunks.iter().map(|c| c.payload.as_ref()).collect();
        assert_eq!(payloads, vec![&b"AABB"[..], b"CCDD", b"EE"]);
        for (index, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_number as usize, index);
            assert_eq!(chunk.total_size, 10);
            assert_eq!(chunk.total_chunk_count, 3);
            assert!(verify_checksum(&chunk.payload, &chunk.checksum));
        }
    }

    #[tokio::test]
    async fn test_resume_starts_at_requested_chunk() {
        let dir = TempDir::new().unwrap();
        let path = source_with(&dir, b"0123456789");

        let streamer = ChunkStreamer::new(&path, 4);
        let chunks: Vec<Chunk> = streamer
            .open(ChunkRequest {
                start_chunk_index: 1,
            })
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].sequence_number, 1);
        assert_eq!(chunks[0].payload.as_ref(), b"4567");
        assert_eq!(chunks[1].sequence_number, 2);
        assert_eq!(chunks[1].payload.as_ref(), b"89");
    }

    #[tokio::test]
    async fn test_start_at_end_of_aligned_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = source_with(&dir, b"01234567");

        let streamer = ChunkStreamer::new(&path, 4);
        let mut stream = streamer
            .open(ChunkRequest {
                start_chunk_index: 2,
            })
            .await
            .unwrap();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_resume_past_end_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = source_with(&dir, b"0123456789");

        let streamer = ChunkStreamer::new(&path, 4);
        let Err(err) = streamer
            .open(ChunkRequest {
                start_chunk_index: 3,
            })
            .await
        else {
            panic!("offset 12 is past a 10 byte source");
        };
        assert!(matches!(
            err,
            TransferError::InvalidResumePoint {
                start_chunk_index: 3,
                offset: 12,
                source_len: 10,
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_source_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let streamer = ChunkStreamer::new(dir.path().join("nope.bin"), 4);
        let Err(err) = streamer.open(ChunkRequest::default()).await else {
            panic!("missing source must not open");
        };
        assert!(matches!(err, TransferError::SourceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_full_size_chunks_and_short_tail() {
        let dir = TempDir::new().unwrap();
        let chunk_size = 64 * 1024;
        let mut data = vec![0_u8; 3 * chunk_size + 100];
        fastrand::Rng::with_seed(7).fill(&mut data);
        let path = source_with(&dir, &data);

        #[allow(clippy::cast_possible_truncation)]
        let streamer = ChunkStreamer::new(&path, chunk_size as u32);
        let chunks: Vec<Chunk> = streamer
            .open(ChunkRequest::default())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();

        let lens: Vec<usize> = chunks.iter().map(|c| c.payload.len()).collect();
        assert_eq!(lens, vec![chunk_size, chunk_size, chunk_size, 100]);
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.to_vec()).collect();
        assert_eq!(joined, data);
    }
}
