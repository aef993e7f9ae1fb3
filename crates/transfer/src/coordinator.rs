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
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::StreamExt;
use snafu::ensure;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, instrument, warn};

use crate::{
    applier::ChunkApplier,
    config::TransferConfig,
    error::{MetadataMismatchSnafu, Result, SequenceGapSnafu, TransferError},
    progress::{LogObserver, ProgressObserver, TransferEvent},
    shard_pool::{WriteShardPool, truncate_to},
    source::{ChunkSource, ChunkStream},
    types::{Chunk, ChunkRequest, FileMetadata},
};

/// Where the coordinator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TransferPhase {
    #[default]
    Idle,
    Streaming,
    RetryWait,
    Done,
}

/// The only state carried from one attempt to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferState {
    /// Length of the prefix of chunks whose writes have completed. The next
    /// attempt resumes here.
    pub confirmed_chunk_count: u32,
    pub attempts:              u32,
    pub phase:                 TransferPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub metadata: FileMetadata,
    pub attempts: u32,
}

/// Drives a transfer to completion, resuming from the last confirmed chunk
/// after every recoverable failure.
///
/// Retries are unbounded and spaced by `retry_delay`. Only errors for which
/// [`TransferError::is_retryable`] is false end the transfer early.
pub struct ResumeCoordinator<S> {
    source:      S,
    destination: PathBuf,
    config:      TransferConfig,
    observer:    Arc<dyn ProgressObserver>,
    state:       TransferState,
}

impl<S: ChunkSource> ResumeCoordinator<S> {
    pub fn new(source: S, destination: impl Into<PathBuf>, config: TransferConfig) -> Self {
        Self {
            source,
            destination: destination.into(),
            config,
            observer: Arc::new(LogObserver::new()),
            state: TransferState::default(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub const fn state(&self) -> TransferState { self.state }

    pub fn destination(&self) -> &Path { &self.destination }

    /// Runs attempts until every chunk is confirmed.
    #[instrument(skip(self), fields(destination = %self.destination.display()))]
    pub async fn run(&mut self) -> Result<TransferOutcome> {
        self.config.validate()?;
        let chunk_size = self.config.chunk_size_bytes()?;

        let metadata = self.fetch_metadata().await?;
        ensure!(
            metadata.chunk_size == chunk_size,
            MetadataMismatchSnafu {
                reason: format!(
                    "source uses {}-byte chunks, consumer is configured for {chunk_size}",
                    metadata.chunk_size
                ),
            }
        );
        info!(
            total_size = metadata.total_size,
            total_chunks = metadata.total_chunk_count,
            "starting transfer"
        );

        while self.state.confirmed_chunk_count < metadata.total_chunk_count {
            self.state.attempts += 1;
            self.state.phase = TransferPhase::Streaming;
            self.observer.on_event(&TransferEvent::AttemptStarted {
                attempt:           self.state.attempts,
                start_chunk_index: self.state.confirmed_chunk_count,
                total_chunks:      metadata.total_chunk_count,
            });

            let reason = match self.run_attempt(&metadata).await {
                Ok(()) if self.state.confirmed_chunk_count >= metadata.total_chunk_count => break,
                Ok(()) => format!(
                    "stream ended after {} of {} chunks",
                    self.state.confirmed_chunk_count, metadata.total_chunk_count
                ),
                Err(err) if err.is_retryable() => err.to_string(),
                Err(err) => return Err(err),
            };
            self.wait_before_retry(&metadata, reason).await;
        }

        truncate_to(&self.destination, metadata.total_size).await?;
        self.state.phase = TransferPhase::Done;
        self.observer.on_event(&TransferEvent::Completed {
            total_chunks: metadata.total_chunk_count,
            total_size:   metadata.total_size,
            attempts:     self.state.attempts,
        });
        Ok(TransferOutcome {
            metadata,
            attempts: self.state.attempts,
        })
    }

    /// Metadata lookups go through the same retry policy as streams, so a
    /// producer that is not up yet does not fail the transfer.
    async fn fetch_metadata(&mut self) -> Result<FileMetadata> {
        loop {
            match self.source.file_metadata().await {
                Ok(metadata) => return Ok(metadata),
                Err(err) if err.is_retryable() => {
                    warn!(
                        error = %err,
                        "failed to fetch file metadata, retrying in {:?}",
                        self.config.retry_delay
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn wait_before_retry(&mut self, metadata: &FileMetadata, reason: String) {
        self.state.phase = TransferPhase::RetryWait;
        self.observer.on_event(&TransferEvent::Retrying {
            attempt: self.state.attempts,
            confirmed: self.state.confirmed_chunk_count,
            total: metadata.total_chunk_count,
            reason,
            delay: self.config.retry_delay,
        });
        tokio::time::sleep(self.config.retry_delay).await;
    }

    /// One attempt: open a stream at the resume point, apply every chunk it
    /// yields, then join all writes and close the pool, whatever the outcome.
    async fn run_attempt(&mut self, metadata: &FileMetadata) -> Result<()> {
        let start = self.state.confirmed_chunk_count;
        let stream = self
            .source
            .open_stream(ChunkRequest {
                start_chunk_index: start,
            })
            .await?;
        let pool = Arc::new(WriteShardPool::open(&self.destination, self.config.shard_count).await?);
        let applier = ChunkApplier::new(Arc::clone(&pool), metadata.chunk_size);

        let mut attempt = Attempt {
            metadata: *metadata,
            applier,
            writes: JoinSet::new(),
            tracker: WriteTracker::new(start),
            next_expected: start,
            max_in_flight: self.config.max_in_flight_writes,
            observer: Arc::clone(&self.observer),
        };

        let consumed = attempt.consume(stream).await;
        let drained = attempt.drain().await;
        let closed = pool.close_all().await;

        self.state.confirmed_chunk_count = attempt.tracker.watermark();
        debug!(
            start_chunk = start,
            received = attempt.next_expected - start,
            confirmed = self.state.confirmed_chunk_count,
            total = metadata.total_chunk_count,
            "attempt finished"
        );

        pick_error([consumed.err(), drained.err(), closed.err()])
    }
}

/// Per-attempt consumption state.
struct Attempt {
    metadata:      FileMetadata,
    applier:       ChunkApplier,
    writes:        JoinSet<Result<u32>>,
    tracker:       WriteTracker,
    next_expected: u32,
    max_in_flight: usize,
    observer:      Arc<dyn ProgressObserver>,
}

impl Attempt {
    /// Reads the stream one chunk at a time and dispatches a write per chunk.
    /// Stops at end of stream or at the first stream, sequence or write
    /// error.
    async fn consume(&mut self, mut stream: ChunkStream) -> Result<()> {
        loop {
            if self.writes.len() >= self.max_in_flight {
                if let Some(joined) = self.writes.join_next().await {
                    self.record(joined)?;
                }
                continue;
            }

            tokio::select! {
                biased;
                Some(joined) = self.writes.join_next(), if !self.writes.is_empty() => {
                    self.record(joined)?;
                }
                next = stream.next() => match next {
                    Some(Ok(chunk)) => self.dispatch(chunk)?,
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
            }
        }
    }

    fn dispatch(&mut self, chunk: Chunk) -> Result<()> {
        ensure!(
            chunk.sequence_number == self.next_expected,
            SequenceGapSnafu {
                expected: self.next_expected,
                actual:   chunk.sequence_number,
            }
        );
        ensure!(
            chunk.total_size == self.metadata.total_size
                && chunk.total_chunk_count == self.metadata.total_chunk_count,
            MetadataMismatchSnafu {
                reason: format!(
                    "chunk {} reports {} bytes in {} chunks, session has {} bytes in {} chunks",
                    chunk.sequence_number,
                    chunk.total_size,
                    chunk.total_chunk_count,
                    self.metadata.total_size,
                    self.metadata.total_chunk_count
                ),
            }
        );
        let sequence_number = chunk.sequence_number;
        ensure!(
            sequence_number < self.metadata.total_chunk_count,
            MetadataMismatchSnafu {
                reason: format!(
                    "chunk {sequence_number} is past the last chunk of {}",
                    self.metadata.total_chunk_count
                ),
            }
        );
        let expected_len = self.metadata.chunk_len(sequence_number);
        ensure!(
            chunk.payload.len() as u64 == expected_len,
            MetadataMismatchSnafu {
                reason: format!(
                    "chunk {sequence_number} carries {} bytes, layout with {}-byte chunks expects \
                     {expected_len}",
                    chunk.payload.len(),
                    self.metadata.chunk_size
                ),
            }
        );
        self.next_expected += 1;

        let applier = self.applier.clone();
        self.writes.spawn(async move { applier.apply(chunk).await });
        Ok(())
    }

    /// Waits for every dispatched write. Keeps joining after a failure so no
    /// write outlives the attempt, and returns the first failure.
    async fn drain(&mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(joined) = self.writes.join_next().await {
            if let Err(err) = self.record(joined) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn record(&mut self, joined: Result<Result<u32>, JoinError>) -> Result<()> {
        let sequence_number = match joined {
            Ok(applied) => applied?,
            Err(err) => {
                return Err(TransferError::TaskPanicked {
                    message: err.to_string(),
                });
            }
        };
        if self.tracker.complete(sequence_number) {
            self.observer.on_event(&TransferEvent::Progress {
                confirmed: self.tracker.watermark(),
                total:     self.metadata.total_chunk_count,
            });
        }
        Ok(())
    }
}

/// Tracks which writes completed and exposes the contiguous prefix.
#[derive(Debug)]
struct WriteTracker {
    watermark: u32,
    pending:   BTreeSet<u32>,
}

impl WriteTracker {
    const fn new(start: u32) -> Self {
        Self {
            watermark: start,
            pending:   BTreeSet::new(),
        }
    }

    /// Records a completed write and returns whether the watermark moved.
    fn complete(&mut self, sequence_number: u32) -> bool {
        let before = self.watermark;
        self.pending.insert(sequence_number);
        while self.pending.remove(&self.watermark) {
            self.watermark += 1;
        }
        self.watermark != before
    }

    const fn watermark(&self) -> u32 { self.watermark }
}

/// Prefers a terminal error over a retryable one so that, for example, a
/// failed disk write is not masked by the stream error that followed it.
fn pick_error<const N: usize>(errors: [Option<TransferError>; N]) -> Result<()> {
    let mut errors: Vec<TransferError> = errors.into_iter().flatten().collect();
    match errors.iter().position(|err| !err.is_retryable()) {
        Some(terminal) => Err(errors.swap_remove(terminal)),
        None if errors.is_empty() => Ok(()),
        None => Err(errors.swap_remove(0)),
    }
}
