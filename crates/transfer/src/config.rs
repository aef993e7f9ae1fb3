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

use std::time::Duration;

use bon::Builder;
use chunkstream_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{OptionExt, ensure};

use crate::error::{InvalidConfigSnafu, Result};

/// Tuning shared by producer and consumer. Paths are passed to the
/// components that use them.
///
/// `chunk_size` is not negotiated on the wire: both sides must be configured
/// with the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct TransferConfig {
    /// Size of every chunk except possibly the last (default: 1MiB)
    #[default(ReadableSize::mb(1))]
    #[builder(default = ReadableSize::mb(1))]
    pub chunk_size: ReadableSize,

    /// Number of independent destination handles (default: 4)
    #[default = 4]
    #[builder(default = 4)]
    pub shard_count: usize,

    /// Pause between a failed attempt and the next one (default: 10s)
    #[default(Duration::from_secs(10))]
    #[builder(default = Duration::from_secs(10))]
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Upper bound on writes dispatched but not yet completed (default: 16)
    #[default = 16]
    #[builder(default = 16)]
    pub max_in_flight_writes: usize,
}

impl TransferConfig {
    pub fn validate(&self) -> Result<()> {
        self.chunk_size_bytes()?;
        ensure!(
            self.shard_count > 0,
            InvalidConfigSnafu {
                reason: "shard_count must be at least 1",
            }
        );
        ensure!(
            self.max_in_flight_writes > 0,
            InvalidConfigSnafu {
                reason: "max_in_flight_writes must be at least 1",
            }
        );
        Ok(())
    }

    /// Chunk size as carried in [`crate::FileMetadata`].
    pub fn chunk_size_bytes(&self) -> Result<u32> {
        let size = u32::try_from(self.chunk_size.as_bytes())
            .ok()
            .context(InvalidConfigSnafu {
                reason: format!("chunk_size {} does not fit in 32 bits", self.chunk_size),
            })?;
        ensure!(
            size > 0,
            InvalidConfigSnafu {
                reason: "chunk_size must be positive",
            }
        );
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransferError;

    #[test]
    fn test_defaults() {
        let config = TransferConfig::default();
        assert_eq!(config.chunk_size, ReadableSize::mb(1));
        assert_eq!(config.shard_count, 4);
        assert_eq!(config.retry_delay, Duration::from_secs(10));
        assert_eq!(config, TransferConfig::builder().build());
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_degenerate_values() {
        let zero_shards = TransferConfig::builder().shard_count(0).build();
        assert!(matches!(
            zero_shards.validate(),
            Err(TransferError::InvalidConfig { .. })
        ));

        let zero_chunk = TransferConfig::builder()
            .chunk_size(ReadableSize::bytes(0))
            .build();
        assert!(zero_chunk.validate().is_err());

        let huge_chunk = TransferConfig::builder()
            .chunk_size(ReadableSize::gb(8))
            .build();
        assert!(huge_chunk.validate().is_err());

        let no_writes = TransferConfig::builder().max_in_flight_writes(0).build();
        assert!(no_writes.validate().is_err());
    }

    #[test]
    fn test_deserialize_human_units() {
        let config: TransferConfig = serde_json::from_str(
            r#"{"chunk_size": "256KiB", "retry_delay": "250ms", "shard_count": 2}"#,
        )
        .unwrap();
        assert_eq!(config.chunk_size_bytes().unwrap(), 256 * 1024);
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.shard_count, 2);
        assert_eq!(config.max_in_flight_writes, 16);
    }
}
