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

use std::{any::Any, path::PathBuf};

use chunkstream_error::{ErrorExt, StackError, StatusCode};
use snafu::Snafu;
use strum::EnumProperty;

#[derive(Debug, Snafu, strum_macros::EnumProperty)]
#[snafu(visibility(pub))]
pub enum ServerError {
    #[snafu(display("Failed to parse address {addr}"))]
    #[strum(props(status_code = "invalid_argument"))]
    ParseAddress {
        addr:   String,
        source: std::net::AddrParseError,
    },

    #[snafu(display("Failed to bind {addr}"))]
    #[strum(props(status_code = "unavailable"))]
    Bind {
        addr:   std::net::SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("Failed to read TLS material from {}", path.display()))]
    #[strum(props(status_code = "invalid_argument"))]
    ReadTlsFile {
        path:   PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Failed to configure TLS"))]
    #[strum(props(status_code = "invalid_argument"))]
    Tls { source: tonic::transport::Error },

    #[snafu(display("Failed to build reflection service"))]
    #[strum(props(status_code = "internal"))]
    Reflection {
        source: tonic_reflection::server::Error,
    },

    #[snafu(display("Server start signal already consumed"))]
    #[strum(props(status_code = "internal"))]
    AlreadyStarted,

    #[snafu(display("Server stopped before it started serving"))]
    #[strum(props(status_code = "unavailable"))]
    StoppedBeforeStart,
}

impl ErrorExt for ServerError {
    fn status_code(&self) -> StatusCode {
        self.get_str("status_code")
            .and_then(|value| value.parse().ok())
            .unwrap_or(StatusCode::Unknown)
    }

    fn as_any(&self) -> &dyn Any { self as _ }
}

impl StackError for ServerError {
    fn debug_fmt(&self, layer: usize, buf: &mut Vec<String>) {
        buf.push(format!("{layer}: {self}"));
    }

    fn next(&self) -> Option<&dyn StackError> { None }
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;
