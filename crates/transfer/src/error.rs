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

use std::{any::Any, path::PathBuf};

use chunkstream_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;
use strum::EnumProperty;

pub type Result<T, E = TransferError> = std::result::Result<T, E>;

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum TransferError {
    #[snafu(display("Source {location} is unavailable"))]
    #[strum(props(status_code = "not_found"))]
    SourceUnavailable {
        location: String,
        source:   std::io::Error,
    },

    #[snafu(display("Destination {} is unavailable", path.display()))]
    #[strum(props(status_code = "internal"))]
    StorageUnavailable {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "Resume point chunk {start_chunk_index} (offset {offset}) exceeds source length \
         {source_len}"
    ))]
    #[strum(props(status_code = "out_of_range"))]
    InvalidResumePoint {
        start_chunk_index: u32,
        offset:            u64,
        source_len:        u64,
    },

    #[snafu(display("Failed to read source at chunk {sequence_number}"))]
    #[strum(props(status_code = "data_loss"))]
    SourceRead {
        sequence_number: u32,
        source:          std::io::Error,
    },

    #[snafu(display("Chunk stream aborted: {reason}"))]
    #[strum(props(status_code = "aborted"))]
    StreamAborted { reason: String },

    #[snafu(display(
        "Checksum mismatch on chunk {sequence_number}: expected {expected}, got {actual}"
    ))]
    #[strum(props(status_code = "data_loss"))]
    ChecksumMismatch {
        sequence_number: u32,
        expected:        String,
        actual:          String,
    },

    #[snafu(display("Expected chunk {expected}, stream delivered chunk {actual}"))]
    #[strum(props(status_code = "aborted"))]
    SequenceGap { expected: u32, actual: u32 },

    #[snafu(display("Failed to write shard {shard} at offset {offset}"))]
    #[strum(props(status_code = "internal"))]
    StorageWrite {
        shard:  usize,
        offset: u64,
        source: std::io::Error,
    },

    #[snafu(display("Shard {index} is closed"))]
    #[strum(props(status_code = "internal"))]
    ShardClosed { index: usize },

    #[snafu(display("Shard index {index} out of range for a pool of {count}"))]
    #[strum(props(status_code = "internal"))]
    ShardOutOfRange { index: usize, count: usize },

    #[snafu(display("Metadata mismatch: {reason}"))]
    #[strum(props(status_code = "invalid_argument"))]
    MetadataMismatch { reason: String },

    #[snafu(display("Invalid transfer configuration: {reason}"))]
    #[strum(props(status_code = "invalid_argument"))]
    InvalidConfig { reason: String },

    #[snafu(display("Write task panicked: {message}"))]
    #[strum(props(status_code = "internal"))]
    TaskPanicked { message: String },
}

impl TransferError {
    /// Whether the resume loop may recover from this error by reopening the
    /// stream at the last confirmed chunk. Everything else ends the transfer.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SourceRead { .. }
                | Self::StreamAborted { .. }
                | Self::ChecksumMismatch { .. }
                | Self::SequenceGap { .. }
        )
    }
}

impl ErrorExt for TransferError {
    fn status_code(&self) -> StatusCode {
        self.get_str("status_code")
            .and_then(|value| value.parse().ok())
            .unwrap_or(StatusCode::Unknown)
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for TransferError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}
