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
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use tracing::{info, warn};

/// Milestones reported by the resume coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    AttemptStarted {
        attempt:           u32,
        start_chunk_index: u32,
        total_chunks:      u32,
    },
    /// The confirmed prefix grew.
    Progress { confirmed: u32, total: u32 },
    Retrying {
        attempt:   u32,
        confirmed: u32,
        total:     u32,
        reason:    String,
        delay:     Duration,
    },
    Completed {
        total_chunks: u32,
        total_size:   u64,
        attempts:     u32,
    },
}

pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

/// Logs attempts, retries and every 10% of confirmed progress.
#[derive(Debug, Default)]
pub struct LogObserver {
    last_decile: AtomicU32,
}

impl LogObserver {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            last_decile: AtomicU32::new(0),
        }
    }
}

impl ProgressObserver for LogObserver {
    fn on_event(&self, event: &TransferEvent) {
        match event {
            TransferEvent::AttemptStarted {
                attempt,
                start_chunk_index,
                total_chunks,
            } => info!(
                attempt,
                start_chunk = start_chunk_index,
                total = total_chunks,
                "starting transfer attempt"
            ),
            TransferEvent::Progress { confirmed, total } => {
                let Some(decile) = decile(*confirmed, *total) else {
                    return;
                };
                if decile > self.last_decile.fetch_max(decile, Ordering::Relaxed) {
                    info!(confirmed, total, "transfer {}% complete", decile * 10);
                }
            }
            TransferEvent::Retrying {
                attempt,
                confirmed,
                total,
                reason,
                delay,
            } => warn!(
                attempt,
                confirmed,
                total,
                reason = %reason,
                "transfer attempt failed, retrying in {delay:?}"
            ),
            TransferEvent::Completed {
                total_chunks,
                total_size,
                attempts,
            } => info!(total_chunks, total_size, attempts, "transfer complete"),
        }
    }
}

fn decile(confirmed: u32, total: u32) -> Option<u32> {
    if total == 0 {
        return None;
    }
    u32::try_from(u64::from(confirmed) * 10 / u64::from(total)).ok()
}
