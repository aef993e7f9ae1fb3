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

pub mod file_service;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use async_trait::async_trait;
use chunkstream_base::readable_size::ReadableSize;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::{net::TcpListener, sync::oneshot};
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::{
    service::RoutesBuilder,
    transport::{Identity, Server, ServerTlsConfig},
};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::v1::{ServerReflection, ServerReflectionServer};
use tracing::info;

use crate::{
    ServiceHandler,
    error::{BindSnafu, ParseAddressSnafu, ReadTlsFileSnafu, ReflectionSnafu, Result, TlsSnafu},
};

/// Default maximum gRPC receiving message size (512 MB)
pub const DEFAULT_MAX_GRPC_RECV_MESSAGE_SIZE: ReadableSize = ReadableSize::mb(512);
/// Default maximum gRPC sending message size (512 MB)
pub const DEFAULT_MAX_GRPC_SEND_MESSAGE_SIZE: ReadableSize = ReadableSize::mb(512);

/// PEM files for serving over TLS.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, bon::Builder)]
pub struct GrpcTlsConfig {
    #[builder(into)]
    pub cert_path: PathBuf,
    #[builder(into)]
    pub key_path:  PathBuf,
}

/// Configuration options for a gRPC server
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, bon::Builder)]
#[serde(default)]
pub struct GrpcServerConfig {
    /// The address to bind the gRPC server. Port 0 picks a free port.
    #[default = "127.0.0.1:50051"]
    #[builder(default = "127.0.0.1:50051".to_string(), into)]
    pub bind_address:          String,
    /// Maximum gRPC receiving (decoding) message size
    #[default(DEFAULT_MAX_GRPC_RECV_MESSAGE_SIZE)]
    #[builder(default = DEFAULT_MAX_GRPC_RECV_MESSAGE_SIZE)]
    pub max_recv_message_size: ReadableSize,
    /// Maximum gRPC sending (encoding) message size
    #[default(DEFAULT_MAX_GRPC_SEND_MESSAGE_SIZE)]
    #[builder(default = DEFAULT_MAX_GRPC_SEND_MESSAGE_SIZE)]
    pub max_send_message_size: ReadableSize,
    /// Serve plaintext when absent.
    pub tls:                   Option<GrpcTlsConfig>,
}

impl GrpcServerConfig {
    pub(crate) fn max_recv_bytes(&self) -> usize {
        usize::try_from(self.max_recv_message_size.as_bytes()).unwrap_or(usize::MAX)
    }

    pub(crate) fn max_send_bytes(&self) -> usize {
        usize::try_from(self.max_send_message_size.as_bytes()).unwrap_or(usize::MAX)
    }
}

/// Trait for gRPC service implementations that provides a standardized way to
/// register services with the gRPC server.
///
/// This trait abstracts the common patterns needed for gRPC services:
/// - Service registration with the tonic routes builder
/// - Reflection support through file descriptor sets
/// - Service identification for logging
/// - Health status management
#[async_trait]
pub trait GrpcServiceHandler: Send + Sync + 'static {
    /// The name of the service for logging and identification purposes
    fn service_name(&self) -> &'static str;
    /// The compiled protobuf file descriptor set used for gRPC reflection
    fn file_descriptor_set(&self) -> &'static [u8];
    /// Wraps the service in its tonic-generated server, applying the
    /// configured message limits, and adds it to the builder
    fn register_service(self: &Arc<Self>, config: &GrpcServerConfig, builder: &mut RoutesBuilder);
    /// Called once the service is registered; reports health until the
    /// token is cancelled
    async fn readiness_reporting(
        self: &Arc<Self>,
        _cancellation_token: CancellationToken,
        health_reporter: HealthReporter,
    ) {
        health_reporter
            .set_service_status("", tonic_health::ServingStatus::Serving)
            .await;
    }
}

/// Starts the gRPC server and returns a handle for managing its lifecycle.
///
/// This method:
/// 1. Binds the configured address
/// 2. Sets up reflection from every service's file descriptor set
/// 3. Sets up the health checking service
/// 4. Spawns the server in a background task
/// 5. Returns a handle for lifecycle management
///
/// # Errors
/// Returns an error if the address cannot be parsed or bound, or if the TLS
/// material cannot be loaded.
pub async fn start_grpc_server(
    config: GrpcServerConfig,
    services: Vec<Arc<impl GrpcServiceHandler>>,
) -> Result<ServiceHandler> {
    let bind_addr = config
        .bind_address
        .parse::<SocketAddr>()
        .context(ParseAddressSnafu {
            addr: config.bind_address.clone(),
        })?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .context(BindSnafu { addr: bind_addr })?;
    let local_addr = listener
        .local_addr()
        .context(BindSnafu { addr: bind_addr })?;

    let mut server = Server::builder();
    if let Some(tls) = &config.tls {
        server = server
            .tls_config(load_tls(tls).await?)
            .context(TlsSnafu)?;
        info!(cert = %tls.cert_path.display(), "gRPC server TLS enabled");
    }

    let reflection_service = {
        let mut file_descriptor_sets = Vec::new();
        for service in &services {
            file_descriptor_sets.push(service.file_descriptor_set());
        }
        file_descriptor_sets.push(tonic_reflection::pb::v1::FILE_DESCRIPTOR_SET);
        build_reflection_service(&file_descriptor_sets)?
    };

    let (reporter, health_service) = tonic_health::server::health_reporter();
    let mut routes_builder = RoutesBuilder::default();
    routes_builder
        .add_service(health_service)
        .add_service(reflection_service);

    for service in &services {
        service.register_service(&config, &mut routes_builder);
    }

    let cancellation_token = CancellationToken::new();
    let (join_handle, started_rx) = {
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let cancellation_token_clone = cancellation_token.clone();
        let join_handle = tokio::spawn(async move {
            let result = server
                .add_routes(routes_builder.routes())
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                    info!("gRPC server (on {}) started", local_addr);
                    let _ = started_tx.send(());
                    cancellation_token_clone.cancelled().await;
                    info!("gRPC server (on {}) received shutdown signal", local_addr);
                })
                .await;

            info!(
                "gRPC server (on {}) task completed: {:?}",
                local_addr, result
            );
        });
        (join_handle, started_rx)
    };

    let reporter_handles = {
        let mut handles = Vec::new();
        for service in &services {
            info!(
                "spawning readiness reporting task for {}",
                service.service_name()
            );
            let service = Arc::clone(service);
            let reporter = reporter.clone();
            let cancellation_token_clone = cancellation_token.clone();
            let handle = tokio::spawn(async move {
                service
                    .readiness_reporting(cancellation_token_clone, reporter)
                    .await;
                info!(
                    "readiness reporting task for {} completed",
                    service.service_name()
                );
            });
            handles.push(handle);
        }
        handles
    };

    Ok(ServiceHandler {
        join_handle,
        cancellation_token,
        started_rx: Some(started_rx),
        reporter_handles,
        local_addr,
    })
}

async fn load_tls(tls: &GrpcTlsConfig) -> Result<ServerTlsConfig> {
    let cert = tokio::fs::read(&tls.cert_path)
        .await
        .context(ReadTlsFileSnafu {
            path: tls.cert_path.clone(),
        })?;
    let key = tokio::fs::read(&tls.key_path)
        .await
        .context(ReadTlsFileSnafu {
            path: tls.key_path.clone(),
        })?;
    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
}

fn build_reflection_service(
    file_descriptor_sets: &[&[u8]],
) -> Result<ServerReflectionServer<impl ServerReflection>> {
    let mut builder = tonic_reflection::server::Builder::configure();

    for file_descriptor_set in file_descriptor_sets {
        builder = builder.register_encoded_file_descriptor_set(file_descriptor_set);
    }
    builder.build_v1().context(ReflectionSnafu)
}
