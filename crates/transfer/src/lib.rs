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

//! Resumable chunked transfer of a single large file.
//!
//! Producer side:
//! - [`MetadataResolver`]: reports size and chunk count of the source file
//! - [`ChunkStreamer`]: emits an ordered, checksummed chunk stream from any
//!   starting chunk
//!
//! Consumer side:
//! - [`WriteShardPool`]: N lock-guarded handles onto the destination file
//! - [`ChunkApplier`]: verifies a chunk and writes it at its exact offset
//! - [`ResumeCoordinator`]: drives attempts until every chunk is applied,
//!   restarting from the last confirmed chunk after a failure
//!
//! The two sides meet at the [`ChunkSource`] trait, implemented in-process by
//! [`LocalChunkSource`] and over gRPC by the client crate.

mod applier;
mod checksum;
mod config;
mod coordinator;
mod error;
mod fixture;
mod metadata;
mod progress;
mod shard_pool;
mod source;
mod streamer;
mod types;

pub use applier::ChunkApplier;
pub use checksum::{sha256_hex, verify_checksum};
pub use config::TransferConfig;
pub use coordinator::{ResumeCoordinator, TransferOutcome, TransferPhase, TransferState};
pub use error::{Result, TransferError};
pub use fixture::generate_source_file;
pub use metadata::MetadataResolver;
pub use progress::{LogObserver, ProgressObserver, TransferEvent};
pub use shard_pool::WriteShardPool;
pub use source::{ChunkSource, ChunkStream, LocalChunkSource};
pub use streamer::ChunkStreamer;
pub use types::{Chunk, ChunkRequest, FileMetadata};
