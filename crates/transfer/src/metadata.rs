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

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::debug;

use crate::{
    error::{Result, SourceUnavailableSnafu},
    types::FileMetadata,
};

/// Stats the source file and reports its chunk layout.
#[derive(Debug, Clone)]
pub struct MetadataResolver {
    source_path: PathBuf,
    chunk_size:  u32,
}

impl MetadataResolver {
    pub fn new(source_path: impl Into<PathBuf>, chunk_size: u32) -> Self {
        Self {
            source_path: source_path.into(),
            chunk_size,
        }
    }

    pub fn source_path(&self) -> &Path { &self.source_path }

    /// Reads the current size of the source. Repeated calls on an unchanged
    /// file return the same metadata.
    pub async fn resolve(&self) -> Result<FileMetadata> {
        let stat = tokio::fs::metadata(&self.source_path)
            .await
            .context(SourceUnavailableSnafu {
                location: self.source_path.display().to_string(),
            })?;
        let metadata = FileMetadata::new(stat.len(), self.chunk_size)?;
        debug!(
            path = %self.source_path.display(),
            total_size = metadata.total_size,
            total_chunks = metadata.total_chunk_count,
            "resolved source metadata"
        );
        Ok(metadata)
    }
}
