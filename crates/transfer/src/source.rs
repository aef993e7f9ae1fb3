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

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::Result,
    metadata::MetadataResolver,
    streamer::ChunkStreamer,
    types::{Chunk, ChunkRequest, FileMetadata},
};

/// Ordered chunks of one attempt. Ends normally at end of file.
pub type ChunkStream = BoxStream<'static, Result<Chunk>>;

/// The producer as seen by the consumer.
///
/// Implementations translate their transport's failures into
/// [`crate::TransferError`]: a broken connection must surface as
/// `StreamAborted` so the resume loop retries it.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    async fn file_metadata(&self) -> Result<FileMetadata>;

    async fn open_stream(&self, request: ChunkRequest) -> Result<ChunkStream>;
}

/// Serves chunks straight from a local file, without a transport.
#[derive(Debug, Clone)]
pub struct LocalChunkSource {
    resolver: MetadataResolver,
    streamer: ChunkStreamer,
}

impl LocalChunkSource {
    pub fn new(source_path: impl Into<PathBuf>, chunk_size: u32) -> Self {
        let source_path = source_path.into();
        Self {
            resolver: MetadataResolver::new(source_path.clone(), chunk_size),
            streamer: ChunkStreamer::new(source_path, chunk_size),
        }
    }
}

#[async_trait]
impl ChunkSource for LocalChunkSource {
    async fn file_metadata(&self) -> Result<FileMetadata> { self.resolver.resolve().await }

    async fn open_stream(&self, request: ChunkRequest) -> Result<ChunkStream> {
        self.streamer.open(request).await
    }
}
