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
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chunkstream_base::readable_size::ReadableSize;
use chunkstream_transfer::{
    ChunkRequest, ChunkSource, ChunkStream, ChunkStreamer, FileMetadata, LocalChunkSource,
    ProgressObserver, ResumeCoordinator, Result, TransferConfig, TransferError, TransferEvent,
    generate_source_file,
};
use futures::{StreamExt, TryStreamExt, stream};
use tempfile::TempDir;

const CHUNK: u32 = 64 * 1024;

fn config(shards: usize) -> TransferConfig {
    TransferConfig::builder()
        .chunk_size(ReadableSize::bytes(u64::from(CHUNK)))
        .shard_count(shards)
        .retry_delay(Duration::from_millis(10))
        .build()
}

/// Simulates a flaky link: every stream is cut after `budget` chunks until
/// `drops` streams have been cut.
struct FlakyLink {
    inner:    LocalChunkSource,
    budget:   usize,
    drops:    AtomicUsize,
    requests: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl ChunkSource for FlakyLink {
    async fn file_metadata(&self) -> Result<FileMetadata> { self.inner.file_metadata().await }

    async fn open_stream(&self, request: ChunkRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.start_chunk_index);
        let inner = self.inner.open_stream(request).await?;
        let cut = self
            .drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !cut {
            return Ok(inner);
        }
        Ok(inner
            .take(self.budget)
            .chain(stream::once(async {
                Err(TransferError::StreamAborted {
                    reason: "link dropped".into(),
                })
            }))
            .boxed())
    }
}

#[derive(Default)]
struct Events(Mutex<Vec<TransferEvent>>);

impl ProgressObserver for Events {
    fn on_event(&self, event: &TransferEvent) { self.0.lock().unwrap().push(event.clone()); }
}

#[tokio::test]
async fn test_transfer_survives_repeated_link_drops() {
    chunkstream_common_telemetry::logging::init_default_ut_logging();
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.bin");
    let destination = dir.path().join("copy.bin");
    let size = 40 * u64::from(CHUNK) + 999;
    generate_source_file(&source_path, size, 2025).await.unwrap();

    let link = FlakyLink {
        inner:    LocalChunkSource::new(&source_path, CHUNK),
        budget:   9,
        drops:    AtomicUsize::new(3),
        requests: Arc::default(),
    };
    let events = Arc::new(Events::default());
    let mut coordinator = ResumeCoordinator::new(link, &destination, config(4))
        .with_observer(Arc::clone(&events) as Arc<dyn ProgressObserver>);

    let outcome = coordinator.run().await.unwrap();

    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.metadata.total_chunk_count, 41);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        std::fs::read(&source_path).unwrap()
    );

    let completed = events
        .0
        .lock()
        .unwrap()
        .iter()
        .filter(|event| matches!(event, TransferEvent::Completed { .. }))
        .count();
    assert_eq!(completed, 1);
}

#[tokio::test]
async fn test_resume_points_follow_confirmed_prefix() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.bin");
    let destination = dir.path().join("copy.bin");
    generate_source_file(&source_path, 10 * u64::from(CHUNK), 7)
        .await
        .unwrap();

    let requests = Arc::new(Mutex::new(Vec::new()));
    let link = FlakyLink {
        inner:    LocalChunkSource::new(&source_path, CHUNK),
        budget:   6,
        drops:    AtomicUsize::new(1),
        requests: Arc::clone(&requests),
    };
    let mut coordinator = ResumeCoordinator::new(link, &destination, config(1));
    coordinator.run().await.unwrap();

    assert_eq!(coordinator.state().confirmed_chunk_count, 10);
    assert_eq!(*requests.lock().unwrap(), vec![0, 6]);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        std::fs::read(&source_path).unwrap()
    );
}

#[tokio::test]
async fn test_streamed_chunks_reassemble_source() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.bin");
    generate_source_file(&source_path, 3 * u64::from(CHUNK) + 5, 11)
        .await
        .unwrap();

    let chunks: Vec<_> = ChunkStreamer::new(&source_path, CHUNK)
        .open(ChunkRequest::default())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[3].payload.len(), 5);
    let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.iter().copied()).collect();
    assert_eq!(joined, std::fs::read(&source_path).unwrap());
}

#[tokio::test]
async fn test_resume_beyond_end_is_rejected() {
    let dir = TempDir::new().unwrap();
    let source_path = dir.path().join("source.bin");
    generate_source_file(&source_path, u64::from(CHUNK), 1)
        .await
        .unwrap();

    let err = LocalChunkSource::new(&source_path, CHUNK)
        .open_stream(ChunkRequest {
            start_chunk_index: 2,
        })
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransferError::InvalidResumePoint { .. }));
    assert!(!err.is_retryable());
}
