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

use crate::gateway::Gateway;
use crate::grpc::interceptor::Chain;
use crate::grpc::tag::{TagService, TagServiceClient, TagServiceServer};
use crate::shutdown::Shutdown;
use crate::tracing::Propagator;
use http::header::CONTENT_TYPE;
use http::{Request, Response, Version};
use hyper::body::Incoming;
use hyper::rt::Executor;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder;
use std::convert::Infallible;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tag_gateway_core::Result as ServerResult;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Barrier;
use tonic::body::BoxBody;
use tracing::{debug, error, info, instrument};

/// GRPC_CONTENT_TYPE is the content type prefix of grpc requests.
const GRPC_CONTENT_TYPE: &str = "application/grpc";

/// Protocol is the stack serving a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Grpc is the grpc stack.
    Grpc,

    /// Gateway is the HTTP/JSON gateway stack.
    Gateway,
}

/// classify routes a request to the grpc stack iff it was received over HTTP/2
/// and its content type contains application/grpc. Everything else, including a
/// grpc content type over HTTP/1.1, is gateway traffic.
pub fn classify<B>(request: &Request<B>) -> Protocol {
    let is_grpc_content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.contains(GRPC_CONTENT_TYPE))
        .unwrap_or(false);

    if request.version() == Version::HTTP_2 && is_grpc_content_type {
        Protocol::Grpc
    } else {
        Protocol::Gateway
    }
}

/// Server serves the grpc stack and the gateway stack on one listener.
pub struct Server<T: TagService> {
    /// grpc is the grpc server of the tag service.
    grpc: TagServiceServer<T>,

    /// client_chain wraps the outbound calls of the gateway.
    client_chain: Chain,

    /// propagator is handed to the gateway.
    propagator: Propagator,

    /// shutdown stops the listener and drains the connections.
    shutdown: Shutdown,
}

/// Server implements the multiplexing server.
impl<T: TagService> Server<T> {
    /// new creates the server.
    pub fn new(
        grpc: TagServiceServer<T>,
        client_chain: Chain,
        propagator: Propagator,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            grpc,
            client_chain,
            propagator,
            shutdown,
        }
    }

    /// run accepts connections on the listener until the shutdown is triggered.
    /// The barrier is waited once the listener accepts, the gateway calls the grpc
    /// stack through the loopback address of the listener. Every connection is
    /// served by a task tracked by the shutdown.
    #[instrument(skip_all)]
    pub async fn run(&self, listener: TcpListener, ready: Arc<Barrier>) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        let client = TagServiceClient::new(
            &format!("http://{}", loopback(local_addr)),
            self.client_chain.clone(),
        )?;
        let gateway = Gateway::new(client, self.propagator.clone());
        info!("server listening on {}", local_addr);

        // Notify the listener is ready, unless the shutdown comes first.
        tokio::select! {
            _ = ready.wait() => {}
            _ = self.shutdown.recv() => {
                info!("server shutting down before ready");
                return Ok(());
            }
        }

        loop {
            tokio::select! {
                tcp_accepted = listener.accept() => {
                    let (tcp, remote_address) = match tcp_accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            error!("accept connection failed: {}", err);
                            continue;
                        }
                    };

                    debug!("accepted connection from {}", remote_address);
                    self.shutdown.spawn(serve_connection(
                        tcp,
                        remote_address,
                        self.grpc.clone(),
                        gateway.clone(),
                        self.shutdown.clone(),
                    ));
                }
                _ = self.shutdown.recv() => {
                    info!("server shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// TrackedExecutor runs the HTTP/2 streams of a connection as tasks tracked by
/// the shutdown.
#[derive(Clone)]
struct TrackedExecutor(Shutdown);

impl<F> Executor<F> for TrackedExecutor
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    fn execute(&self, future: F) {
        self.0.spawn(async move {
            future.await;
        });
    }
}

/// serve_connection serves HTTP/1.1 and h2c prior knowledge on the connection and
/// classifies every request. An HTTP/1.1 request asking to upgrade to h2c is
/// served as HTTP/1.1, grpc clients have to speak HTTP/2 from the first byte.
///
/// Every request gets a child of the connection token. The token is cancelled
/// when the connection ends or the shutdown is triggered, the latter also closes
/// the connection gracefully once its requests are answered.
async fn serve_connection<T: TagService>(
    tcp: TcpStream,
    remote_address: SocketAddr,
    grpc: TagServiceServer<T>,
    gateway: Gateway,
    shutdown: Shutdown,
) {
    let token = shutdown.connection_token();
    let _cancel_on_close = token.clone().drop_guard();

    let request_token = token.clone();
    let service = service_fn(move |mut request: Request<Incoming>| {
        let grpc = grpc.clone();
        let gateway = gateway.clone();
        request.extensions_mut().insert(request_token.child_token());

        async move {
            let response: Response<BoxBody> = match classify(&request) {
                Protocol::Grpc => grpc.handle(request).await,
                Protocol::Gateway => gateway.handle(request).await,
            };

            Ok::<_, Infallible>(response)
        }
    });

    let builder = Builder::new(TrackedExecutor(shutdown));
    let connection = builder.serve_connection_with_upgrades(TokioIo::new(tcp), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        _ = token.cancelled() => {
            debug!("closing connection from {}", remote_address);
            connection.as_mut().graceful_shutdown();
            connection.await
        }
    };

    if let Err(err) = result {
        debug!("connection from {} closed: {}", remote_address, err);
    }
}

/// loopback returns the loopback address of the listener, an unspecified address
/// is replaced by the loopback address of its family.
fn loopback(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}
