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

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chunkstream_api::pb::transfer::v1::{
    FileChunk, FileMetadataRequest, FileRequest, file_service_client::FileServiceClient,
};
use chunkstream_transfer::{
    Chunk, ChunkRequest, ChunkSource, ChunkStream, FileMetadata, Result as TransferResult,
    TransferError,
};
use futures::StreamExt;
use snafu::ResultExt;
use tonic::{
    Code, Status,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
};
use tracing::{debug, info};

use crate::{
    config::GrpcClientConfig,
    error::{InvalidEndpointSnafu, ReadCaCertificateSnafu, Result, TlsSnafu},
};

/// A remote producer reached over gRPC.
///
/// The channel connects lazily, so a producer that is down surfaces as a
/// retryable error on the first call instead of failing construction.
#[derive(Debug)]
pub struct GrpcChunkSource {
    client:     FileServiceClient<Channel>,
    endpoint:   String,
    chunk_size: u32,
    /// Last total size reported by the producer, for error context.
    known_size: AtomicU64,
}

impl GrpcChunkSource {
    pub async fn connect(config: &GrpcClientConfig, chunk_size: u32) -> Result<Self> {
        let mut endpoint = Endpoint::from_shared(config.endpoint.clone())
            .context(InvalidEndpointSnafu {
                endpoint: config.endpoint.clone(),
            })?
            .connect_timeout(config.connect_timeout);

        if let Some(tls) = &config.tls {
            let ca = tokio::fs::read(&tls.ca_path)
                .await
                .context(ReadCaCertificateSnafu {
                    path: tls.ca_path.clone(),
                })?;
            let mut tls_config = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));
            if let Some(domain) = &tls.domain_name {
                tls_config = tls_config.domain_name(domain.clone());
            }
            endpoint = endpoint.tls_config(tls_config).context(TlsSnafu {
                endpoint: config.endpoint.clone(),
            })?;
        }

        let max_decoding = usize::try_from(config.max_decoding_message_size.as_bytes())
            .unwrap_or(usize::MAX);
        let client = FileServiceClient::new(endpoint.connect_lazy())
            .max_decoding_message_size(max_decoding);
        info!(endpoint = %config.endpoint, chunk_size, "created producer client");

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            chunk_size,
            known_size: AtomicU64::new(0),
        })
    }

    pub fn endpoint(&self) -> &str { &self.endpoint }
}

#[async_trait]
impl ChunkSource for GrpcChunkSource {
    async fn file_metadata(&self) -> TransferResult<FileMetadata> {
        let context = StatusContext::new(self, 0);
        let response = self
            .client
            .clone()
            .get_file_metadata(FileMetadataRequest {})
            .await
            .map_err(|status| context.error(&status, 0))?
            .into_inner();

        let total_size = from_wire(response.total_size, "total_size")?;
        let total_chunks = from_wire(response.total_chunks, "total_chunks")?;
        self.known_size.store(total_size, Ordering::Relaxed);
        debug!(total_size, total_chunks, "received file metadata");
        FileMetadata::from_remote(total_size, total_chunks, self.chunk_size)
    }

    async fn open_stream(&self, request: ChunkRequest) -> TransferResult<ChunkStream> {
        let start = request.start_chunk_index;
        let context = StatusContext::new(self, start);
        let start_chunk = i32::try_from(start).map_err(|_| TransferError::InvalidResumePoint {
            start_chunk_index: start,
            offset:            context.offset(start),
            source_len:        context.source_len,
        })?;

        let messages = self
            .client
            .clone()
            .get_file_stream(FileRequest { start_chunk })
            .await
            .map_err(|status| context.error(&status, start))?
            .into_inner();

        let mut next = start;
        let chunks = messages.map(move |message| {
            let sequence_number = next;
            next = next.saturating_add(1);
            message
                .map_err(|status| context.error(&status, sequence_number))
                .and_then(chunk_from_wire)
        });
        Ok(chunks.boxed())
    }
}

/// What a status needs to become a [`TransferError`].
#[derive(Debug, Clone)]
struct StatusContext {
    endpoint:    String,
    chunk_size:  u32,
    start_chunk: u32,
    source_len:  u64,
}

impl StatusContext {
    fn new(source: &GrpcChunkSource, start_chunk: u32) -> Self {
        Self {
            endpoint: source.endpoint.clone(),
            chunk_size: source.chunk_size,
            start_chunk,
            source_len: source.known_size.load(Ordering::Relaxed),
        }
    }

    fn offset(&self, sequence_number: u32) -> u64 {
        u64::from(sequence_number) * u64::from(self.chunk_size)
    }

    /// NOT_FOUND, OUT_OF_RANGE and DATA_LOSS carry the producer's own
    /// classification. Anything else, including transport failures, is an
    /// aborted stream.
    fn error(&self, status: &Status, sequence_number: u32) -> TransferError {
        match status.code() {
            Code::NotFound => TransferError::SourceUnavailable {
                location: self.endpoint.clone(),
                source:   std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    status.message().to_string(),
                ),
            },
            Code::OutOfRange => TransferError::InvalidResumePoint {
                start_chunk_index: self.start_chunk,
                offset:            self.offset(self.start_chunk),
                source_len:        self.source_len,
            },
            Code::DataLoss => TransferError::SourceRead {
                sequence_number,
                source: std::io::Error::other(status.message().to_string()),
            },
            code => TransferError::StreamAborted {
                reason: format!("{code:?}: {}", status.message()),
            },
        }
    }
}

fn from_wire<T, U: TryFrom<T>>(value: T, field: &str) -> TransferResult<U> {
    U::try_from(value).map_err(|_| TransferError::StreamAborted {
        reason: format!("producer sent an out of range {field}"),
    })
}

fn chunk_from_wire(message: FileChunk) -> TransferResult<Chunk> {
    Ok(Chunk {
        sequence_number:   from_wire(message.sequence_number, "sequence_number")?,
        total_size:        from_wire(message.total_size, "total_size")?,
        total_chunk_count: from_wire(message.total_chunks, "total_chunks")?,
        checksum:          message.checksum,
        payload:           message.chunk_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> StatusContext {
        StatusContext {
            endpoint:    "http://producer:50051".into(),
            chunk_size:  1024,
            start_chunk: 4,
            source_len:  3000,
        }
    }

    #[test]
    fn test_status_mapping() {
        let err = context().error(&Status::not_found("no such file"), 0);
        assert!(matches!(err, TransferError::SourceUnavailable { .. }));
        assert!(!err.is_retryable());

        let err = context().error(&Status::out_of_range("past end"), 4);
        match err {
            TransferError::InvalidResumePoint {
                start_chunk_index,
                offset,
                source_len,
            } => {
                assert_eq!(start_chunk_index, 4);
                assert_eq!(offset, 4096);
                assert_eq!(source_len, 3000);
            }
            other => panic!("unexpected {other:?}"),
        }

        let err = context().error(&Status::data_loss("read failed"), 6);
        assert!(matches!(
            err,
            TransferError::SourceRead {
                sequence_number: 6,
                ..
            }
        ));
        assert!(err.is_retryable());

        for status in [
            Status::unavailable("connection refused"),
            Status::cancelled("reset"),
            Status::internal("boom"),
        ] {
            let err = context().error(&status, 0);
            assert!(matches!(err, TransferError::StreamAborted { .. }));
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_malformed_chunk_is_rejected() {
        let message = FileChunk {
            sequence_number: -1,
            chunk_data:      (&b"abc"[..]).into(),
            total_size:      3,
            checksum:        String::new(),
            total_chunks:    1,
        };
        assert!(matches!(
            chunk_from_wire(message),
            Err(TransferError::StreamAborted { .. })
        ));
    }
}
