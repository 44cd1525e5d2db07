/*
 *     Copyright 2026 The Tag Gateway Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tag_gateway::grpc::interceptor::Chain;
use tag_gateway::grpc::tag::TagServiceServer;
use tag_gateway::mux::Server;
use tag_gateway::service::{TagServer, Upstream};
use tag_gateway::shutdown;
use tag_gateway::tracing::{init_tracer, init_tracing};
use tag_gateway_config::gateway;
use tokio::net::TcpListener;
use std::time::Duration;
use tokio::sync::Barrier;
use tracing::{error, info, Level};

/// SHUTDOWN_TIMEOUT bounds the wait for the connections to close on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(
    name = gateway::NAME,
    author,
    version,
    about = "tag-gateway serves the tag service over grpc and HTTP/JSON on one port",
    long_about = "A front-end of the tag service that serves grpc over h2c and an HTTP/JSON gateway \
    of the same service on one listener. Every inbound and outbound call is traced, logged and \
    bounded by a deadline."
)]
struct Args {
    #[arg(
        short = 'c',
        long = "config",
        default_value_os_t = gateway::default_gateway_config_path(),
        help = "Specify config file to use")
    ]
    config: PathBuf,

    #[arg(
        short = 'p',
        long = "port",
        help = "Specify the port of the listener, overrides the port of the config file"
    )]
    port: Option<u16>,

    #[arg(
        short = 'l',
        long,
        default_value = "info",
        help = "Specify the logging level [trace, debug, info, warn, error]"
    )]
    log_level: Level,

    #[arg(
        long,
        default_value_os_t = gateway::default_gateway_log_dir(),
        help = "Specify the log directory"
    )]
    log_dir: PathBuf,

    #[arg(
        long,
        default_value_t = 24,
        help = "Specify the max number of log files"
    )]
    log_max_files: usize,

    #[arg(
        long = "verbose",
        default_value_t = false,
        help = "Specify whether to print log"
    )]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Parse command line arguments.
    let args = Args::parse();

    // Load config.
    let mut config = gateway::Config::load(&args.config).await?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Initialize tracing.
    let _guards = init_tracing(
        gateway::NAME,
        &args.log_dir,
        args.log_level,
        args.log_max_files,
        args.verbose,
    )?;
    std::panic::set_hook(Box::new(tracing_panic::panic_hook));

    // Initialize the tracer before the listener accepts.
    let telemetry = init_tracer(&config.tracing).inspect_err(|err| {
        error!("initialize tracer failed: {}", err);
    })?;
    let propagator = telemetry.propagator();
    let client_chain = Chain::client(propagator.clone(), config.client.default_timeout);

    // Initialize the tag service.
    let upstream = Upstream::new(&config.upstream, client_chain.clone()).inspect_err(|err| {
        error!("initialize upstream failed: {}", err);
    })?;
    let grpc = TagServiceServer::new(
        TagServer::new(upstream),
        Chain::server(propagator.clone()),
    );

    // Initialize the shutdown of the listener and its connections.
    let shutdown = shutdown::Shutdown::new();

    // Initialize the server.
    let listener = TcpListener::bind(config.server_addr())
        .await
        .inspect_err(|err| {
            error!("bind {} failed: {}", config.server_addr(), err);
        })?;
    let server = Server::new(grpc, client_chain, propagator, shutdown.clone());

    let ready = Arc::new(Barrier::new(2));
    let server_ready = ready.clone();
    let mut server_handle = tokio::spawn(async move { server.run(listener, server_ready).await });

    // Wait for the listener to be ready.
    tokio::select! {
        _ = ready.wait() => {
            info!("tag gateway started at pid {}", std::process::id());
        }
        result = &mut server_handle => {
            telemetry.shutdown();
            return Err(anyhow::anyhow!("server exited before ready: {:?}", result));
        }
    }

    // Wait for the server to exit or shutdown signal.
    tokio::select! {
        result = server_handle => {
            info!("server exited: {:?}", result);
        },

        result = shutdown::shutdown_signal() => {
            if let Err(err) = result {
                error!("listen shutdown signal failed: {}", err);
            }
        },
    }

    // Trigger shutdown, the calls in flight are cancelled and the connections
    // closed before the pending spans are flushed.
    shutdown.trigger();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown.wait())
        .await
        .is_err()
    {
        error!("connections were not closed within {:?}", SHUTDOWN_TIMEOUT);
    }

    // Flush the pending spans.
    telemetry.shutdown();
    Ok(())
}
