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

//! Deterministic test payloads for exercising a transfer end to end.

use std::path::Path;

use snafu::ResultExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::info;

use crate::error::{Result, StorageUnavailableSnafu, StorageWriteSnafu};

const BLOCK_SIZE: usize = 1024 * 1024;

/// Writes `size` pseudo-random bytes derived from `seed` to `path`, replacing
/// any existing file. The same seed always yields the same content.
pub async fn generate_source_file(path: impl AsRef<Path>, size: u64, seed: u64) -> Result<u64> {
    let path = path.as_ref();
    let file = tokio::fs::File::create(path)
        .await
        .context(StorageUnavailableSnafu { path })?;
    let mut writer = BufWriter::new(file);
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut block = vec![0_u8; BLOCK_SIZE];

    let mut written = 0_u64;
    while written < size {
        let len = usize::try_from(size - written).map_or(BLOCK_SIZE, |rest| rest.min(BLOCK_SIZE));
        rng.fill(&mut block[..len]);
        writer
            .write_all(&block[..len])
            .await
            .context(StorageWriteSnafu {
                shard:  0_usize,
                offset: written,
            })?;
        written += len as u64;
    }
    writer.flush().await.context(StorageWriteSnafu {
        shard:  0_usize,
        offset: written,
    })?;
    writer
        .into_inner()
        .sync_all()
        .await
        .context(StorageWriteSnafu {
            shard:  0_usize,
            offset: written,
        })?;

    info!(path = %path.display(), size, seed, "generated source file");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_same_seed_same_content() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        let size = BLOCK_SIZE as u64 + 17;

        assert_eq!(generate_source_file(&a, size, 42).await.unwrap(), size);
        generate_source_file(&b, size, 42).await.unwrap();

        let a = std::fs::read(a).unwrap();
        assert_eq!(a.len() as u64, size);
        assert_eq!(a, std::fs::read(b).unwrap());
    }

    #[tokio::test]
    async fn test_different_seeds_differ() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        generate_source_file(&a, 4096, 1).await.unwrap();
        generate_source_file(&b, 4096, 2).await.unwrap();
        assert_ne!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[tokio::test]
    async fn test_zero_size_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.bin");
        generate_source_file(&path, 0, 0).await.unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 0);
    }
}
