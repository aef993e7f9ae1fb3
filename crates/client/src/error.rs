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

use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ClientError {
    #[snafu(display("Invalid producer endpoint {endpoint}"))]
    InvalidEndpoint {
        endpoint: String,
        source:   tonic::transport::Error,
    },

    #[snafu(display("Failed to read CA certificate {}", path.display()))]
    ReadCaCertificate {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to configure TLS for {endpoint}"))]
    Tls {
        endpoint: String,
        source:   tonic::transport::Error,
    },
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
