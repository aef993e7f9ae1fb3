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

use std::sync::Arc;

use snafu::ensure;
use tracing::trace;

use crate::{
    checksum::{sha256_hex, verify_checksum},
    error::{ChecksumMismatchSnafu, Result},
    shard_pool::WriteShardPool,
    types::Chunk,
};

/// Verifies received chunks and writes them to their shard.
#[derive(Debug, Clone)]
pub struct ChunkApplier {
    pool:       Arc<WriteShardPool>,
    chunk_size: u32,
}

impl ChunkApplier {
    pub const fn new(pool: Arc<WriteShardPool>, chunk_size: u32) -> Self {
        Self { pool, chunk_size }
    }

    /// Checks `chunk.checksum` against the payload.
    pub fn verify(chunk: &Chunk) -> Result<()> {
        ensure!(
            verify_checksum(&chunk.payload, &chunk.checksum),
            ChecksumMismatchSnafu {
                sequence_number: chunk.sequence_number,
                expected:        chunk.checksum.clone(),
                actual:          sha256_hex(&chunk.payload),
            }
        );
        Ok(())
    }

    /// Verifies `chunk` and writes its payload at
    /// `sequence_number * chunk_size` through shard
    /// `sequence_number % shard_count`.
    ///
    /// A chunk that fails verification is never written. Returns the
    /// sequence number of the applied chunk.
    pub async fn apply(&self, chunk: Chunk) -> Result<u32> {
        Self::verify(&chunk)?;

        let sequence_number = chunk.sequence_number;
        let offset = chunk.offset(self.chunk_size);
        let shard = self.shard_for(sequence_number);
        trace!(sequence_number, offset, shard, len = chunk.payload.len(), "applying chunk");
        self.pool.write_at(shard, offset, chunk.payload).await?;
        Ok(sequence_number)
    }

    #[must_use]
    pub fn shard_for(&self, sequence_number: u32) -> usize {
        sequence_number as usize % self.pool.shard_count()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::TransferError;

    fn chunk(sequence_number: u32, payload: &'static [u8]) -> Chunk {
        Chunk {
            sequence_number,
            payload: Bytes::from_static(payload),
            checksum: sha256_hex(payload),
            total_size: 12,
            total_chunk_count: 3,
        }
    }

    #[tokio::test]
    async fn test_apply_writes_at_sequence_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let pool = Arc::new(WriteShardPool::open(&path, 2).await.unwrap());
        let applier = ChunkApplier::new(Arc::clone(&pool), 4);

        assert_eq!(applier.apply(chunk(2, b"IJKL")).await.unwrap(), 2);
        assert_eq!(applier.apply(chunk(0, b"ABCD")).await.unwrap(), 0);
        assert_eq!(applier.apply(chunk(1, b"EFGH")).await.unwrap(), 1);
        pool.close_all().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"ABCDEFGHIJKL");
    }

    #[tokio::test]
    async fn test_corrupted_chunk_is_rejected_and_not_written() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.bin");
        let pool = Arc::new(WriteShardPool::open(&path, 2).await.unwrap());
        let applier = ChunkApplier::new(Arc::clone(&pool), 4);

        let mut bad = chunk(1, b"EFGH");
        bad.payload = Bytes::from_static(b"EFGX");
        let err = applier.apply(bad).await.unwrap_err();
        assert!(matches!(
            err,
            TransferError::ChecksumMismatch {
                sequence_number: 1,
                ..
            }
        ));
        assert!(err.is_retryable());
        pool.close_all().await.unwrap();

        assert!(std::fs::read(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shard_selection_is_sequence_modulo_count() {
        let dir = TempDir::new().unwrap();
        let pool = Arc::new(
            WriteShardPool::open(dir.path().join("out.bin"), 4)
                .await
                .unwrap(),
        );
        let applier = ChunkApplier::new(pool, 1024);
        let shards: Vec<usize> = (0..9).map(|seq| applier.shard_for(seq)).collect();
        assert_eq!(shards, vec![0, 1, 2, 3, 0, 1, 2, 3, 0]);
    }
}
