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

use chunkstream_app::{FetchConfig, ServeConfig};
use chunkstream_base::readable_size::ReadableSize;
use chunkstream_client::{GrpcClientConfig, GrpcClientTlsConfig};
use chunkstream_common_telemetry::{
    logging::{LogFormat, LoggingOptions, init_global_logging},
    panic_hook::set_panic_hook,
};
use chunkstream_server::grpc::{GrpcServerConfig, GrpcTlsConfig};
use chunkstream_transfer::{TransferConfig, generate_source_file};
use clap::{Args, Parser, Subcommand, ValueEnum};
use snafu::{ResultExt, Whatever};

mod build_info;

#[derive(Debug, Parser)]
#[clap(
name = "chunkstream",
about = "Resumable chunked file transfer over gRPC",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(flatten)]
    logging: LoggingArgs,

    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Serve(ServeArgs),
    Fetch(FetchArgs),
    Generate(GenerateArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

#[derive(Debug, Clone, Args)]
struct LoggingArgs {
    /// Log filter, e.g. "info" or "info,chunkstream_transfer=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    /// Also write rotated log files into this directory
    #[arg(long, global = true, default_value = "")]
    log_dir: String,
}

impl LoggingArgs {
    fn options(&self) -> LoggingOptions {
        LoggingOptions::builder()
            .maybe_level(self.log_level.clone())
            .log_format(match self.log_format {
                LogFormatArg::Text => LogFormat::Text,
                LogFormatArg::Json => LogFormat::Json,
            })
            .dir(self.log_dir.clone())
            .build()
    }
}

/// Settings both sides must agree on.
#[derive(Debug, Clone, Args)]
struct TransferArgs {
    /// Chunk size, e.g. "1MiB"; producer and consumer must use the same value
    #[arg(long, default_value = "1MiB")]
    chunk_size: ReadableSize,

    /// Number of destination file handles
    #[arg(long, default_value_t = 4)]
    shard_count: usize,

    /// Pause between a failed attempt and the next one
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    retry_delay: Duration,

    /// Upper bound on chunk writes in flight
    #[arg(long, default_value_t = 16)]
    max_in_flight_writes: usize,
}

impl TransferArgs {
    fn config(&self) -> TransferConfig {
        TransferConfig::builder()
            .chunk_size(self.chunk_size)
            .shard_count(self.shard_count)
            .retry_delay(self.retry_delay)
            .max_in_flight_writes(self.max_in_flight_writes)
            .build()
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Serves a file to consumers until interrupted.
Examples:

chunkstream serve --source large_file.bin
chunkstream serve --bind 0.0.0.0:50051 --tls-cert server.crt --tls-key server.key

")]
struct ServeArgs {
    #[arg(long, default_value = "large_file.bin")]
    source: PathBuf,

    #[arg(long, default_value = "127.0.0.1:50051")]
    bind: String,

    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,

    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,

    #[command(flatten)]
    transfer: TransferArgs,
}

impl ServeArgs {
    async fn run(self) -> Result<(), Whatever> {
        let tls = self
            .tls_cert
            .zip(self.tls_key)
            .map(|(cert_path, key_path)| GrpcTlsConfig { cert_path, key_path });
        let grpc_config = GrpcServerConfig::builder()
            .bind_address(self.bind)
            .maybe_tls(tls)
            .build();
        ServeConfig::builder()
            .grpc_config(grpc_config)
            .transfer_config(self.transfer.config())
            .source_path(self.source)
            .build()
            .open()
            .run()
            .await
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Fetches a file from a producer, resuming after every interruption.
Examples:

chunkstream fetch --endpoint http://127.0.0.1:50051 --output received_file.bin
chunkstream fetch --endpoint https://files.example.com --tls-ca ca.pem

")]
struct FetchArgs {
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    endpoint: String,

    #[arg(long, default_value = "received_file.bin")]
    output: PathBuf,

    /// CA bundle for verifying a TLS producer
    #[arg(long)]
    tls_ca: Option<PathBuf>,

    /// Server name to verify, when it differs from the endpoint host
    #[arg(long, requires = "tls_ca")]
    tls_domain: Option<String>,

    #[command(flatten)]
    transfer: TransferArgs,
}

impl FetchArgs {
    async fn run(self) -> Result<(), Whatever> {
        let tls = self.tls_ca.map(|ca_path| GrpcClientTlsConfig {
            ca_path,
            domain_name: self.tls_domain,
        });
        let client_config = GrpcClientConfig::builder()
            .endpoint(self.endpoint)
            .maybe_tls(tls)
            .build();
        FetchConfig::builder()
            .client_config(client_config)
            .transfer_config(self.transfer.config())
            .destination_path(self.output)
            .build()
            .open()
            .run()
            .await
            .map(|_| ())
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Writes a file of deterministic pseudo-random bytes to serve.
Examples:

chunkstream generate --size 1GiB --output large_file.bin

")]
struct GenerateArgs {
    #[arg(long, default_value = "1GiB")]
    size: ReadableSize,

    #[arg(long, default_value = "large_file.bin")]
    output: PathBuf,

    #[arg(long, default_value_t = 0)]
    seed: u64,
}

impl GenerateArgs {
    async fn run(self) -> Result<(), Whatever> {
        let written = generate_source_file(&self.output, self.size.as_bytes(), self.seed)
            .await
            .whatever_context("Failed to generate source file")?;
        println!("Wrote {} to {}", ReadableSize(written), self.output.display());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    let _guards = init_global_logging("chunkstream", &cli.logging.options());
    set_panic_hook();

    match cli.commands {
        Commands::Serve(args) => args.run().await,
        Commands::Fetch(args) => args.run().await,
        Commands::Generate(args) => args.run().await,
    }
}
