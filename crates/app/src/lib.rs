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

//! Wires the core, the gRPC server and the gRPC client into the two
//! processes of a transfer: the producer ([`ServeApp`]) and the consumer
//! ([`FetchApp`]).

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bon::Builder;
use chunkstream_client::{GrpcChunkSource, GrpcClientConfig};
use chunkstream_server::{
    ServiceHandler,
    grpc::{GrpcServerConfig, file_service::FileService, start_grpc_server},
};
use chunkstream_transfer::{ResumeCoordinator, TransferConfig, TransferOutcome};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::{ResultExt, Whatever, whatever};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Producer process: serves one file until shut down.
#[derive(SmartDefault)]
pub struct ServeApp {
    pub config:             ServeConfig,
    /// Controls if the application should continue running
    #[default(_code = "Arc::new(AtomicBool::new(false))")]
    pub running:            Arc<AtomicBool>,
    #[default(_code = "CancellationToken::new()")]
    pub cancellation_token: CancellationToken,
}

#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct ServeConfig {
    #[builder(default)]
    pub grpc_config:              GrpcServerConfig,
    #[builder(default)]
    pub transfer_config:          TransferConfig,
    /// File served to consumers.
    #[default(_code = "PathBuf::from(\"large_file.bin\")")]
    #[builder(default = PathBuf::from("large_file.bin"), into)]
    pub source_path:              PathBuf,
    /// Stop on Ctrl+C or SIGTERM, not only on an explicit shutdown.
    #[default = true]
    #[builder(default = true)]
    pub enable_graceful_shutdown: bool,
}

impl ServeConfig {
    #[must_use]
    pub fn open(self) -> ServeApp {
        ServeApp {
            config: self,
            ..Default::default()
        }
    }
}

/// Handle for controlling a running producer.
pub struct AppHandle {
    /// Sender for triggering shutdown
    shutdown_tx:        Option<oneshot::Sender<()>>,
    running:            Arc<AtomicBool>,
    cancellation_token: CancellationToken,
    local_addr:         std::net::SocketAddr,
}

impl AppHandle {
    /// Gracefully shutdown the application
    pub fn shutdown(&mut self) {
        info!("Initiating graceful shutdown");
        self.running.store(false, Ordering::SeqCst);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool { self.running.load(Ordering::SeqCst) }

    /// Address the gRPC server is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> std::net::SocketAddr { self.local_addr }

    /// Wait for the servers to stop
    pub async fn wait_for_shutdown(&self) { self.cancellation_token.cancelled().await; }
}

impl ServeApp {
    /// Start serving and return a handle for controlling the producer
    pub async fn start(&self) -> Result<AppHandle, Whatever> {
        let chunk_size = self
            .config
            .transfer_config
            .chunk_size_bytes()
            .whatever_context("Invalid chunk size")?;
        if !self.config.source_path.is_file() {
            warn!(
                source = %self.config.source_path.display(),
                "source file does not exist yet; requests will fail until it does"
            );
        }

        info!(
            source = %self.config.source_path.display(),
            chunk_size,
            "Starting chunkstream producer"
        );
        self.running.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let service = Arc::new(FileService::new(&self.config.source_path, chunk_size));
        let mut grpc_handle = start_grpc_server(self.config.grpc_config.clone(), vec![service])
            .await
            .whatever_context("Failed to start gRPC server")?;
        grpc_handle
            .wait_for_start()
            .await
            .whatever_context("gRPC server failed to start")?;

        let app_handle = AppHandle {
            shutdown_tx:        Some(shutdown_tx),
            running:            Arc::clone(&self.running),
            cancellation_token: self.cancellation_token.clone(),
            local_addr:         grpc_handle.local_addr(),
        };
        info!(addr = %grpc_handle.local_addr(), "Producer started successfully");

        let running = Arc::clone(&self.running);
        let cancellation_token = self.cancellation_token.clone();
        let enable_graceful_shutdown = self.config.enable_graceful_shutdown;

        tokio::spawn(async move {
            if enable_graceful_shutdown {
                shutdown_signal(shutdown_rx).await;
            } else {
                let _ = shutdown_rx.await;
            }

            running.store(false, Ordering::SeqCst);
            stop_server(grpc_handle).await;
            cancellation_token.cancel();
            info!("Application shutdown complete");
        });

        Ok(app_handle)
    }

    /// Run the producer, blocking until it's shut down
    pub async fn run(self) -> Result<(), Whatever> {
        let handle = self.start().await?;
        handle.wait_for_shutdown().await;
        Ok(())
    }
}

async fn stop_server(handle: ServiceHandler) {
    info!("Shutting down gRPC server");
    handle.shutdown();
    handle.wait_for_stop().await;
}

/// Consumer process: fetches one file and exits.
#[derive(Debug, Clone, Serialize, Deserialize, SmartDefault, Builder)]
#[serde(default)]
pub struct FetchConfig {
    #[builder(default)]
    pub client_config:    GrpcClientConfig,
    #[builder(default)]
    pub transfer_config:  TransferConfig,
    /// Where the fetched file is written.
    #[default(_code = "PathBuf::from(\"received_file.bin\")")]
    #[builder(default = PathBuf::from("received_file.bin"), into)]
    pub destination_path: PathBuf,
}

pub struct FetchApp {
    pub config: FetchConfig,
}

impl FetchConfig {
    #[must_use]
    pub const fn open(self) -> FetchApp { FetchApp { config: self } }
}

impl FetchApp {
    /// Runs the transfer until it completes, fails terminally, or the
    /// process is asked to stop.
    pub async fn run(self) -> Result<TransferOutcome, Whatever> {
        let (_stop_tx, stop_rx) = oneshot::channel();
        self.run_until(shutdown_signal(stop_rx)).await
    }

    /// Like [`FetchApp::run`], but stops when `stop` resolves instead of on
    /// a signal. Chunks confirmed so far stay in the destination file.
    pub async fn run_until(
        self,
        stop: impl Future<Output = ()>,
    ) -> Result<TransferOutcome, Whatever> {
        let FetchConfig {
            client_config,
            transfer_config,
            destination_path,
        } = self.config;
        let chunk_size = transfer_config
            .chunk_size_bytes()
            .whatever_context("Invalid chunk size")?;

        let source = GrpcChunkSource::connect(&client_config, chunk_size)
            .await
            .whatever_context("Failed to set up producer client")?;
        info!(
            endpoint = source.endpoint(),
            destination = %destination_path.display(),
            "Starting chunkstream fetch"
        );

        let mut coordinator = ResumeCoordinator::new(source, destination_path, transfer_config);
        tokio::select! {
            outcome = coordinator.run() => {
                let outcome = outcome.whatever_context("Transfer failed")?;
                info!(
                    total_size = outcome.metadata.total_size,
                    attempts = outcome.attempts,
                    "File received successfully"
                );
                Ok(outcome)
            }
            () = stop => {
                let state = coordinator.state();
                whatever!(
                    "Transfer interrupted with {} chunks confirmed after {} attempts",
                    state.confirmed_chunk_count,
                    state.attempts
                )
            }
        }
    }
}

async fn shutdown_signal(shutdown_rx: oneshot::Receiver<()>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C signal"); },
        () = terminate => { info!("Received terminate signal"); },
        _ = shutdown_rx => { info!("Received shutdown signal"); },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chunkstream_base::readable_size::ReadableSize;
    use chunkstream_transfer::generate_source_file;
    use tempfile::TempDir;

    use super::*;

    const CHUNK: u64 = 16 * 1024;

    fn transfer_config() -> TransferConfig {
        TransferConfig::builder()
            .chunk_size(ReadableSize::bytes(CHUNK))
            .retry_delay(Duration::from_millis(20))
            .build()
    }

    async fn start_producer(dir: &TempDir) -> (PathBuf, AppHandle) {
        let source = dir.path().join("large_file.bin");
        generate_source_file(&source, 7 * CHUNK + 11, 1).await.unwrap();
        let app = ServeConfig::builder()
            .grpc_config(GrpcServerConfig::builder().bind_address("127.0.0.1:0").build())
            .transfer_config(transfer_config())
            .source_path(&source)
            .enable_graceful_shutdown(false)
            .build()
            .open();
        let handle = app.start().await.unwrap();
        (source, handle)
    }

    #[tokio::test]
    async fn test_app_creation() {
        let app = ServeConfig::default().open();
        assert!(!app.running.load(Ordering::SeqCst));
        assert_eq!(app.config.source_path, PathBuf::from("large_file.bin"));
    }

    #[tokio::test]
    async fn test_serve_then_fetch() {
        chunkstream_common_telemetry::logging::init_default_ut_logging();
        let dir = TempDir::new().unwrap();
        let (source, mut handle) = start_producer(&dir).await;
        assert!(handle.is_running());

        let destination = dir.path().join("received_file.bin");
        let outcome = FetchConfig::builder()
            .client_config(
                GrpcClientConfig::builder()
                    .endpoint(format!("http://{}", handle.local_addr()))
                    .build(),
            )
            .transfer_config(transfer_config())
            .destination_path(&destination)
            .build()
            .open()
            .run_until(std::future::pending())
            .await
            .unwrap();
        assert_eq!(outcome.metadata.total_chunk_count, 8);
        assert_eq!(
            std::fs::read(&destination).unwrap(),
            std::fs::read(&source).unwrap()
        );

        handle.shutdown();
        handle.wait_for_shutdown().await;
        assert!(!handle.is_running());
    }

    #[tokio::test]
    async fn test_fetch_can_be_interrupted() {
        let dir = TempDir::new().unwrap();
        let result = FetchConfig::builder()
            .client_config(
                GrpcClientConfig::builder()
                    .endpoint("http://127.0.0.1:9")
                    .connect_timeout(Duration::from_millis(50))
                    .build(),
            )
            .transfer_config(transfer_config())
            .destination_path(dir.path().join("out.bin"))
            .build()
            .open()
            .run_until(tokio::time::sleep(Duration::from_millis(200)))
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("interrupted"));
    }
}
