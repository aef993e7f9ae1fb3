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
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use snafu::{OptionExt, ResultExt};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{
    Result, ShardClosedSnafu, ShardOutOfRangeSnafu, StorageUnavailableSnafu, StorageWriteSnafu,
    TaskPanickedSnafu, TransferError,
};

type ShardHandle = Arc<Mutex<Option<File>>>;

/// A fixed set of handles onto one destination file, each behind its own
/// lock.
///
/// Writes are positional, so handles never share a cursor. Two writes on
/// different shards run in parallel; two writes on the same shard are
/// serialized by that shard's lock.
#[derive(Debug)]
pub struct WriteShardPool {
    path:   PathBuf,
    shards: Vec<ShardHandle>,
}

impl WriteShardPool {
    /// Opens `shard_count` read/write handles on `path`, creating the file if
    /// needed. Existing content is kept so a resumed transfer only fills in
    /// the missing ranges.
    ///
    /// If any open fails, the handles opened so far are dropped.
    pub async fn open(path: impl AsRef<Path>, shard_count: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            let file = tokio::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)
                .await
                .context(StorageUnavailableSnafu { path: &path })?
                .into_std()
                .await;
            shards.push(Arc::new(Mutex::new(Some(file))));
        }
        debug!(path = %path.display(), shard_count, "opened write shard pool");
        Ok(Self { path, shards })
    }

    pub fn path(&self) -> &Path { &self.path }

    pub fn shard_count(&self) -> usize { self.shards.len() }

    /// Writes `bytes` at exactly `offset` through shard `shard_index`.
    ///
    /// Waits for the shard's lock, then performs the write on the blocking
    /// pool while still holding it.
    pub async fn write_at(&self, shard_index: usize, offset: u64, bytes: Bytes) -> Result<()> {
        let shard = self
            .shards
            .get(shard_index)
            .context(ShardOutOfRangeSnafu {
                index: shard_index,
                count: self.shards.len(),
            })?;
        let guard = Arc::clone(shard).lock_owned().await;

        tokio::task::spawn_blocking(move || {
            let file = (*guard).as_ref().context(ShardClosedSnafu { index: shard_index })?;
            write_all_at(file, &bytes, offset).context(StorageWriteSnafu {
                shard: shard_index,
                offset,
            })
        })
        .await
        .map_err(|err| TransferError::TaskPanicked {
            message: err.to_string(),
        })?
    }

    /// Flushes and releases every handle that is still open.
    ///
    /// Safe to call more than once; already closed shards are skipped. All
    /// shards are closed even if one flush fails, and the first failure is
    /// returned.
    pub async fn close_all(&self) -> Result<()> {
        let mut first_error = None;
        for (index, shard) in self.shards.iter().enumerate() {
            let Some(file) = shard.lock().await.take() else {
                continue;
            };
            let synced = match tokio::task::spawn_blocking(move || file.sync_all()).await {
                Ok(res) => res.context(StorageWriteSnafu {
                    shard:  index,
                    offset: 0_u64,
                }),
                Err(err) => TaskPanickedSnafu {
                    message: format!("sync of shard {index}: {err}"),
                }
                .fail(),
            };
            if let Err(err) = synced {
                warn!(path = %self.path.display(), shard = index, error = %err, "failed to flush shard");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Sets the destination length to exactly `len`, dropping any bytes left
/// over from an earlier, longer file at the same path.
pub async fn truncate_to(path: &Path, len: u64) -> Result<()> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .await
        .context(StorageUnavailableSnafu { path })?;
    file.set_len(len)
        .await
        .context(StorageWriteSnafu {
            shard:  0_usize,
            offset: len,
        })?;
    file.sync_all().await.context(StorageWriteSnafu {
        shard:  0_usize,
        offset: len,
    })
}

#[cfg(unix)]
fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
    std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
}

#[cfg(windows)]
fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_write(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf = &buf[n..];
                offset += n as u64;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
