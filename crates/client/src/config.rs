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

use std::{path::PathBuf, time::Duration};

use chunkstream_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Large enough for a 512 MiB chunk plus framing.
pub const DEFAULT_MAX_DECODING_MESSAGE_SIZE: ReadableSize = ReadableSize::mb(513);

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, bon::Builder)]
pub struct GrpcClientTlsConfig {
    /// PEM bundle used to verify the producer.
    #[builder(into)]
    pub ca_path:     PathBuf,
    /// Overrides the name checked against the certificate.
    #[builder(into)]
    pub domain_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct GrpcClientConfig {
    /// Producer URI, e.g. `http://127.0.0.1:50051`.
    #[default = "http://127.0.0.1:50051"]
    #[builder(default = "http://127.0.0.1:50051".to_string(), into)]
    pub endpoint: String,

    #[default(Duration::from_secs(5))]
    #[builder(default = Duration::from_secs(5))]
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Upper bound on one decoded chunk message. Must exceed the chunk size.
    #[default(DEFAULT_MAX_DECODING_MESSAGE_SIZE)]
    #[builder(default = DEFAULT_MAX_DECODING_MESSAGE_SIZE)]
    pub max_decoding_message_size: ReadableSize,

    /// Connect in plaintext when absent.
    pub tls: Option<GrpcClientTlsConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GrpcClientConfig::default();
        assert_eq!(config.endpoint, "http://127.0.0.1:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.tls.is_none());
        assert_eq!(GrpcClientConfig::builder().build(), config);
    }
}
