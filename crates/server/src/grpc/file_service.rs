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

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chunkstream_api::pb::transfer::v1::{
    FileChunk, FileMetadataRequest, FileMetadataResponse, FileRequest,
    file_service_server::{self, FileServiceServer},
};
use chunkstream_error::ErrorExt;
use chunkstream_transfer::{
    Chunk, ChunkRequest, ChunkStreamer, FileMetadata, MetadataResolver, TransferError,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, service::RoutesBuilder};
use tonic_health::server::HealthReporter;
use tracing::{info, warn};

use crate::grpc::{GrpcServerConfig, GrpcServiceHandler};

/// Chunks buffered between the file reader and the gRPC sink.
const STREAM_BUFFER: usize = 4;

/// Serves one source file over `chunkstream.transfer.v1.FileService`.
#[derive(Debug, Clone)]
pub struct FileService {
    resolver: MetadataResolver,
    streamer: ChunkStreamer,
}

impl FileService {
    pub fn new(source_path: impl Into<PathBuf>, chunk_size: u32) -> Self {
        let source_path = source_path.into();
        Self {
            resolver: MetadataResolver::new(source_path.clone(), chunk_size),
            streamer: ChunkStreamer::new(source_path, chunk_size),
        }
    }
}

fn status_of(err: &TransferError) -> Status {
    warn!(error = %err, "file service request failed");
    err.to_status()
}

fn wire_int<T, U: TryFrom<T>>(value: T, field: &str) -> Result<U, Status> {
    U::try_from(value).map_err(|_| Status::out_of_range(format!("{field} does not fit the wire type")))
}

fn metadata_to_wire(metadata: &FileMetadata) -> Result<FileMetadataResponse, Status> {
    Ok(FileMetadataResponse {
        total_size:   wire_int(metadata.total_size, "total_size")?,
        total_chunks: wire_int(metadata.total_chunk_count, "total_chunks")?,
    })
}

fn chunk_to_wire(chunk: Chunk) -> Result<FileChunk, Status> {
    Ok(FileChunk {
        sequence_number: wire_int(chunk.sequence_number, "sequence_number")?,
        total_size:      wire_int(chunk.total_size, "total_size")?,
        total_chunks:    wire_int(chunk.total_chunk_count, "total_chunks")?,
        checksum:        chunk.checksum,
        chunk_data:      chunk.payload,
    })
}

#[async_trait]
impl file_service_server::FileService for FileService {
    type GetFileStreamStream = ReceiverStream<Result<FileChunk, Status>>;

    async fn get_file_metadata(
        &self,
        _request: Request<FileMetadataRequest>,
    ) -> Result<Response<FileMetadataResponse>, Status> {
        let metadata = self.resolver.resolve().await.map_err(|e| status_of(&e))?;
        Ok(Response::new(metadata_to_wire(&metadata)?))
    }

    async fn get_file_stream(
        &self,
        request: Request<FileRequest>,
    ) -> Result<Response<Self::GetFileStreamStream>, Status> {
        let start_chunk = request.into_inner().start_chunk;
        let start_chunk_index = u32::try_from(start_chunk).map_err(|_| {
            Status::invalid_argument(format!("start_chunk must not be negative, got {start_chunk}"))
        })?;

        let mut chunks = self
            .streamer
            .open(ChunkRequest { start_chunk_index })
            .await
            .map_err(|e| status_of(&e))?;
        info!(start_chunk_index, "serving chunk stream");

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        tokio::spawn(async move {
            let mut sent = 0_u32;
            while let Some(item) = chunks.next().await {
                let message = match item {
                    Ok(chunk) => chunk_to_wire(chunk),
                    Err(err) => Err(status_of(&err)),
                };
                let failed = message.is_err();
                if tx.send(message).await.is_err() {
                    let err = TransferError::StreamAborted {
                        reason: "consumer went away".to_string(),
                    };
                    info!(start_chunk_index, sent, error = %err, "chunk stream closed early");
                    return;
                }
                if failed {
                    return;
                }
                sent += 1;
            }
            info!(start_chunk_index, sent, "chunk stream finished");
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

#[async_trait]
impl GrpcServiceHandler for FileService {
    fn service_name(&self) -> &'static str { "FileService" }

    fn file_descriptor_set(&self) -> &'static [u8] { chunkstream_api::pb::GRPC_DESC }

    fn register_service(self: &Arc<Self>, config: &GrpcServerConfig, builder: &mut RoutesBuilder) {
        builder.add_service(
            FileServiceServer::from_arc(Arc::clone(self))
                .max_decoding_message_size(config.max_recv_bytes())
                .max_encoding_message_size(config.max_send_bytes()),
        );
    }

    async fn readiness_reporting(
        self: &Arc<Self>,
        cancellation_token: CancellationToken,
        reporter: HealthReporter,
    ) {
        reporter.set_serving::<FileServiceServer<Self>>().await;
        cancellation_token.cancelled().await;
        reporter.set_not_serving::<FileServiceServer<Self>>().await;
    }
}
