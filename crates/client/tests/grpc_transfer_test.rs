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

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use chunkstream_base::readable_size::ReadableSize;
use chunkstream_client::{GrpcChunkSource, GrpcClientConfig};
use chunkstream_server::{
    ServiceHandler,
    grpc::{GrpcServerConfig, file_service::FileService, start_grpc_server},
};
use chunkstream_transfer::{
    ResumeCoordinator, TransferConfig, TransferError, generate_source_file,
};
use tempfile::TempDir;

const CHUNK: u32 = 32 * 1024;

async fn serve(source: &Path, bind: SocketAddr, chunk_size: u32) -> ServiceHandler {
    let config = GrpcServerConfig::builder()
        .bind_address(bind.to_string())
        .build();
    let service = Arc::new(FileService::new(source, chunk_size));
    let mut handle = start_grpc_server(config, vec![service]).await.unwrap();
    handle.wait_for_start().await.unwrap();
    handle
}

fn transfer_config() -> TransferConfig {
    TransferConfig::builder()
        .chunk_size(ReadableSize::bytes(u64::from(CHUNK)))
        .shard_count(3)
        .retry_delay(Duration::from_millis(50))
        .build()
}

async fn client(addr: SocketAddr) -> GrpcChunkSource {
    let config = GrpcClientConfig::builder()
        .endpoint(format!("http://{addr}"))
        .build();
    GrpcChunkSource::connect(&config, CHUNK).await.unwrap()
}

#[tokio::test]
async fn test_fetch_over_grpc_matches_source() {
    chunkstream_common_telemetry::logging::init_default_ut_logging();
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    let destination = dir.path().join("fetched.bin");
    generate_source_file(&source, 20 * u64::from(CHUNK) + 321, 99)
        .await
        .unwrap();

    let server = serve(&source, "127.0.0.1:0".parse().unwrap(), CHUNK).await;
    let mut coordinator =
        ResumeCoordinator::new(client(server.local_addr()).await, &destination, transfer_config());
    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.metadata.total_chunk_count, 21);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        std::fs::read(&source).unwrap()
    );

    server.shutdown();
    server.wait_for_stop().await;
}

#[tokio::test]
async fn test_fetch_waits_for_late_producer() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    let destination = dir.path().join("fetched.bin");
    generate_source_file(&source, 5 * u64::from(CHUNK), 3)
        .await
        .unwrap();

    let addr = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap()
    };
    let late_source = source.clone();
    let server = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        serve(&late_source, addr, CHUNK).await
    });

    let mut coordinator = ResumeCoordinator::new(client(addr).await, &destination, transfer_config());
    coordinator.run().await.unwrap();
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        std::fs::read(&source).unwrap()
    );

    let server = server.await.unwrap();
    server.shutdown();
    server.wait_for_stop().await;
}

#[tokio::test]
async fn test_missing_remote_source_is_terminal() {
    let dir = TempDir::new().unwrap();
    let server = serve(
        &dir.path().join("absent.bin"),
        "127.0.0.1:0".parse().unwrap(),
        CHUNK,
    )
    .await;

    let mut coordinator = ResumeCoordinator::new(
        client(server.local_addr()).await,
        dir.path().join("fetched.bin"),
        transfer_config(),
    );
    let err = coordinator.run().await.unwrap_err();
    assert!(matches!(err, TransferError::SourceUnavailable { .. }));

    server.shutdown();
    server.wait_for_stop().await;
}

#[tokio::test]
async fn test_chunk_size_disagreement_is_terminal() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("source.bin");
    generate_source_file(&source, 10 * u64::from(CHUNK), 5)
        .await
        .unwrap();
    let server = serve(&source, "127.0.0.1:0".parse().unwrap(), CHUNK * 2).await;

    let mut coordinator = ResumeCoordinator::new(
        client(server.local_addr()).await,
        dir.path().join("fetched.bin"),
        transfer_config(),
    );
    let err = coordinator.run().await.unwrap_err();
    assert!(matches!(err, TransferError::MetadataMismatch { .. }));

    server.shutdown();
    server.wait_for_stop().await;
}
