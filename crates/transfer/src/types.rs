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

use bytes::Bytes;
use snafu::{OptionExt, ensure};

use crate::error::{MetadataMismatchSnafu, Result};

/// Size and chunk layout of a source file, fixed for one transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    pub total_size:        u64,
    pub chunk_size:        u32,
    pub total_chunk_count: u32,
}

impl FileMetadata {
    /// Derives the chunk count as `ceil(total_size / chunk_size)`.
    pub fn new(total_size: u64, chunk_size: u32) -> Result<Self> {
        ensure!(
            chunk_size > 0,
            MetadataMismatchSnafu {
                reason: "chunk size must be positive",
            }
        );
        let total_chunk_count = u32::try_from(total_size.div_ceil(u64::from(chunk_size)))
            .ok()
            .context(MetadataMismatchSnafu {
                reason: format!("{total_size} bytes in {chunk_size}-byte chunks exceeds u32 chunks"),
            })?;
        Ok(Self {
            total_size,
            chunk_size,
            total_chunk_count,
        })
    }

    /// Builds metadata from a producer report and checks that the reported
    /// chunk count agrees with the locally configured chunk size.
    pub fn from_remote(total_size: u64, total_chunk_count: u32, chunk_size: u32) -> Result<Self> {
        let local = Self::new(total_size, chunk_size)?;
        ensure!(
            local.total_chunk_count == total_chunk_count,
            MetadataMismatchSnafu {
                reason: format!(
                    "producer reports {total_chunk_count} chunks for {total_size} bytes, \
                     expected {} with chunk size {chunk_size}",
                    local.total_chunk_count
                ),
            }
        );
        Ok(local)
    }

    /// Byte offset of chunk `sequence_number` in the file.
    #[must_use]
    pub const fn chunk_offset(&self, sequence_number: u32) -> u64 {
        sequence_number as u64 * self.chunk_size as u64
    }

    /// Expected payload length of chunk `sequence_number`; 0 past the end.
    #[must_use]
    pub const fn chunk_len(&self, sequence_number: u32) -> u64 {
        let offset = self.chunk_offset(sequence_number);
        if offset >= self.total_size {
            return 0;
        }
        let remaining = self.total_size - offset;
        if remaining < self.chunk_size as u64 {
            remaining
        } else {
            self.chunk_size as u64
        }
    }
}

/// Asks the producer to start emitting at `start_chunk_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkRequest {
    pub start_chunk_index: u32,
}

/// One checksummed slice of the source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub sequence_number:   u32,
    pub payload:           Bytes,
    /// Lowercase hex SHA-256 of `payload`.
    pub checksum:          String,
    pub total_size:        u64,
    pub total_chunk_count: u32,
}

impl Chunk {
    #[must_use]
    pub const fn offset(&self, chunk_size: u32) -> u64 {
        self.sequence_number as u64 * chunk_size as u64
    }
}
