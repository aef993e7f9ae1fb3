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

//! gRPC consumer side of a chunkstream transfer.
//!
//! [`GrpcChunkSource`] adapts `chunkstream.transfer.v1.FileService` to
//! [`chunkstream_transfer::ChunkSource`], so a
//! [`chunkstream_transfer::ResumeCoordinator`] can pull from a remote
//! producer exactly as it would from a local file.

mod config;
mod error;
mod source;

pub use config::{GrpcClientConfig, GrpcClientTlsConfig};
pub use error::{ClientError, Result};
pub use source::GrpcChunkSource;
