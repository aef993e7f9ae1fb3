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

pub mod error;
pub mod grpc;

use std::net::SocketAddr;

use futures::future::join_all;
use snafu::OptionExt;
use tokio::{sync::oneshot::Receiver, task::JoinHandle};
use tokio_util::sync::CancellationToken;

pub use crate::error::{Result, ServerError};
use crate::error::{AlreadyStartedSnafu, StoppedBeforeStartSnafu};

/// Handle for managing a running gRPC service.
///
/// This handle provides control over a running service, allowing you to:
/// - Wait for the service to start accepting connections
/// - Signal graceful shutdown
/// - Wait for the service to fully stop
///
/// The handle uses a cancellation token for graceful shutdown and provides
/// async methods for coordinating server lifecycle events.
pub struct ServiceHandler {
    /// Join handle for the server task
    join_handle:        JoinHandle<()>,
    /// Token for signalling shutdown
    cancellation_token: CancellationToken,
    /// Receiver for server start notification
    started_rx:         Option<Receiver<()>>,
    /// Join handles for readiness reporting tasks
    reporter_handles:   Vec<JoinHandle<()>>,
    /// Address the listener is actually bound to
    local_addr:         SocketAddr,
}

impl ServiceHandler {
    /// Waits for the server to start accepting connections.
    ///
    /// Fails if called more than once, or if the server task ended before
    /// it started serving.
    pub async fn wait_for_start(&mut self) -> Result<()> {
        self.started_rx
            .take()
            .context(AlreadyStartedSnafu)?
            .await
            .ok()
            .context(StoppedBeforeStartSnafu)
    }

    /// Waits for the server and its readiness reporters to stop. Call
    /// `shutdown()` first.
    pub async fn wait_for_stop(self) {
        let handles = self
            .reporter_handles
            .into_iter()
            .chain(std::iter::once(self.join_handle));
        join_all(handles).await;
    }

    /// Signals the server to begin graceful shutdown.
    pub fn shutdown(&self) { self.cancellation_token.cancel(); }

    pub fn is_finished(&self) -> bool { self.join_handle.is_finished() }

    /// The bound address. Differs from the configured one when binding to
    /// port 0.
    pub const fn local_addr(&self) -> SocketAddr { self.local_addr }
}
