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

//! Generated protobuf types and gRPC stubs.

pub mod pb {
    pub mod transfer {
        pub mod v1 {
            #![allow(clippy::all, clippy::pedantic, clippy::nursery)]
            tonic::include_proto!("chunkstream.transfer.v1");
        }
    }

    /// Encoded file descriptor set for every compiled proto, used by gRPC
    /// reflection.
    pub const GRPC_DESC: &[u8] = tonic::include_file_descriptor_set!("chunkstream_grpc_desc");
}
