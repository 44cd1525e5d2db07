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

#![allow(dead_code)]

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tag_gateway::grpc::interceptor::Chain;
use tag_gateway::grpc::tag::{TagService, TagServiceClient, TagServiceServer};
use tag_gateway::mux::Server;
use tag_gateway::service::{TagServer, Upstream};
use tag_gateway::shutdown::Shutdown;
use tag_gateway::tracing::Propagator;
use tag_gateway_config::gateway::Upstream as UpstreamConfig;
use tokio::net::TcpListener;
use tokio::sync::Barrier;

pub const TAGS: &str = r#"{
    "list": [
        {"id": 1, "name": "Go", "state": 1},
        {"id": 2, "name": "Rust", "state": 1}
    ],
    "pager": {"page": 1, "page_size": 10, "total_rows": 2}
}"#;

/// Behavior is how the stub upstream answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Tags,
    Garbage,
    Hang,
}

/// Received is one request received by the stub upstream.
#[derive(Debug, Clone)]
pub struct Received {
    pub query: Option<String>,
    pub traceparent: Option<String>,
}

/// StubUpstream is the tag api the gateway forwards to.
pub struct StubUpstream {
    pub addr: SocketAddr,
    pub received: Arc<Mutex<Vec<Received>>>,
}

pub async fn start_upstream(behavior: Behavior) -> StubUpstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));

    let recorded = received.clone();
    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let service = service_fn(move |request: Request<Incoming>| {
                    recorded.lock().unwrap().push(Received {
                        query: request.uri().query().map(str::to_string),
                        traceparent: request
                            .headers()
                            .get("traceparent")
                            .and_then(|value| value.to_str().ok())
                            .map(str::to_string),
                    });

                    async move {
                        match behavior {
                            Behavior::Tags => Ok::<_, Infallible>(Response::new(Full::new(
                                Bytes::from_static(TAGS.as_bytes()),
                            ))),
                            Behavior::Garbage => {
                                Ok(Response::new(Full::new(Bytes::from_static(b"<html>"))))
                            }
                            Behavior::Hang => std::future::pending().await,
                        }
                    }
                });

                let _ = hyper_util::server::conn::auto::Builder::new(TokioExecutor::new())
                    .serve_connection(TokioIo::new(tcp), service)
                    .await;
            });
        }
    });

    StubUpstream { addr, received }
}

/// TestGateway is a running server on an ephemeral port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub exporter: InMemorySpanExporter,
    pub propagator: Propagator,
    pub shutdown: Shutdown,
    _provider: SdkTracerProvider,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn grpc_client(&self) -> TagServiceClient {
        TagServiceClient::new(
            &format!("http://{}", self.addr),
            Chain::client(self.propagator.clone(), Duration::from_secs(60)),
        )
        .unwrap()
    }
}

pub async fn start_gateway(upstream: SocketAddr, default_timeout: Duration) -> TestGateway {
    start_gateway_with(
        move |chain| {
            let config = UpstreamConfig {
                addr: format!("http://{}", upstream),
                ..Default::default()
            };
            TagServer::new(Upstream::new(&config, chain).unwrap())
        },
        default_timeout,
    )
    .await
}

pub async fn start_gateway_with<T, F>(build: F, default_timeout: Duration) -> TestGateway
where
    T: TagService,
    F: FnOnce(Chain) -> T,
{
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let propagator = Propagator::new(provider.tracer("e2e"));

    let client_chain = Chain::client(propagator.clone(), default_timeout);
    let grpc = TagServiceServer::new(
        build(client_chain.clone()),
        Chain::server(propagator.clone()),
    );

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Server::new(grpc, client_chain, propagator.clone(), shutdown.clone());

    let ready = Arc::new(Barrier::new(2));
    let server_ready = ready.clone();
    tokio::spawn(async move { server.run(listener, server_ready).await });
    ready.wait().await;

    TestGateway {
        addr,
        exporter,
        propagator,
        shutdown,
        _provider: provider,
    }
}
