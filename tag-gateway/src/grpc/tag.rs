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

use crate::context::{grpc_timeout_from_metadata, CallContext};
use crate::grpc::interceptor::{Call, Chain, Reply};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::uri::PathAndQuery;
use std::sync::Arc;
use tag_gateway_api::tag::v1::{
    GetTagListReply, GetTagListRequest, Tag, GET_TAG_LIST_PATH, STREAM_TAG_LIST_PATH,
};
use tag_gateway_core::{Error as ClientError, Result as ClientResult};
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::codec::ProstCodec;
use tonic::server::{Grpc, ServerStreamingService, UnaryService};
use tonic::transport::Channel;
use tonic::{Extensions, Request, Response, Status};
use tracing::{error, instrument};

/// TagStream is the reply stream of StreamTagList.
pub type TagStream = BoxStream<'static, Result<Tag, Status>>;

/// TagService is the business implementation of tag.v1.TagService. It receives a
/// call context already processed by the server chain.
#[tonic::async_trait]
pub trait TagService: Send + Sync + 'static {
    /// get_tag_list returns the tags matching the request.
    async fn get_tag_list(
        &self,
        context: CallContext,
        request: GetTagListRequest,
    ) -> Result<GetTagListReply, Status>;

    /// stream_tag_list returns the tags matching the request, one message per tag.
    async fn stream_tag_list(
        &self,
        context: CallContext,
        request: GetTagListRequest,
    ) -> Result<TagStream, Status>;
}

/// TagServiceServer dispatches the grpc requests of tag.v1.TagService through the
/// server chain to the service.
pub struct TagServiceServer<T: TagService> {
    /// service is the business implementation.
    service: Arc<T>,

    /// chain is the server chain wrapping every call.
    chain: Chain,
}

/// TagServiceServer implements Clone.
impl<T: TagService> Clone for TagServiceServer<T> {
    fn clone(&self) -> Self {
        Self {
            service: self.service.clone(),
            chain: self.chain.clone(),
        }
    }
}

/// TagServiceServer implements the grpc server of the tag service.
impl<T: TagService> TagServiceServer<T> {
    /// new creates the server of the service wrapped by the chain.
    pub fn new(service: T, chain: Chain) -> Self {
        Self {
            service: Arc::new(service),
            chain,
        }
    }

    /// handle serves one grpc request.
    pub async fn handle<B>(&self, request: http::Request<B>) -> http::Response<BoxBody>
    where
        B: hyper::body::Body + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    {
        match request.uri().path() {
            GET_TAG_LIST_PATH => {
                let service = GetTagListService {
                    service: self.service.clone(),
                    chain: self.chain.clone(),
                };

                let mut grpc = Grpc::new(ProstCodec::default());
                grpc.unary(service, request).await
            }
            STREAM_TAG_LIST_PATH => {
                let service = StreamTagListService {
                    service: self.service.clone(),
                    chain: self.chain.clone(),
                };

                let mut grpc = Grpc::new(ProstCodec::default());
                grpc.server_streaming(service, request).await
            }
            path => unimplemented(path),
        }
    }
}

/// unimplemented returns the grpc response of an unknown method.
fn unimplemented(path: &str) -> http::Response<BoxBody> {
    let mut response = http::Response::new(tonic::body::empty_body());
    let headers = response.headers_mut();
    headers.insert("grpc-status", HeaderValue::from(tonic::Code::Unimplemented as i32));
    if let Ok(message) = HeaderValue::from_str(&format!("unknown method {}", path)) {
        headers.insert("grpc-message", message);
    }
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    response
}

/// server_context creates the call context of an inbound grpc request. The
/// deadline comes from the grpc-timeout header and the cancellation token from
/// the connection serving the request.
fn server_context(
    method: &'static str,
    metadata: tonic::metadata::MetadataMap,
    extensions: &Extensions,
) -> CallContext {
    let timeout = grpc_timeout_from_metadata(&metadata);
    let cancellation = extensions
        .get::<CancellationToken>()
        .cloned()
        .unwrap_or_default();

    let context = CallContext::new(method)
        .with_metadata(metadata)
        .with_cancellation(cancellation);
    match timeout {
        Some(timeout) => context.with_timeout(timeout),
        None => context,
    }
}

struct GetTagListService<T: TagService> {
    service: Arc<T>,
    chain: Chain,
}

impl<T: TagService> UnaryService<GetTagListRequest> for GetTagListService<T> {
    type Response = GetTagListReply;
    type Future = BoxFuture<'static, Result<Response<Self::Response>, Status>>;

    fn call(&mut self, request: Request<GetTagListRequest>) -> Self::Future {
        let service = self.service.clone();
        let chain = self.chain.clone();
        let (metadata, extensions, message) = request.into_parts();
        let context = server_context(GET_TAG_LIST_PATH, metadata, &extensions);

        Box::pin(async move {
            let handler = move |call: Call| {
                let service = service.clone();
                async move {
                    let (context, request) = call.into_parts::<GetTagListRequest>()?;
                    let reply = context
                        .run(service.get_tag_list(context.clone(), request))
                        .await??;
                    Ok::<_, Status>(Reply::unary(reply))
                }
            };

            let reply = chain.run(Call::new(context, message), &handler).await?;
            Ok(Response::new(reply.into_unary::<GetTagListReply>()?))
        })
    }
}

struct StreamTagListService<T: TagService> {
    service: Arc<T>,
    chain: Chain,
}

impl<T: TagService> ServerStreamingService<GetTagListRequest> for StreamTagListService<T> {
    type Response = Tag;
    type ResponseStream = TagStream;
    type Future = BoxFuture<'static, Result<Response<Self::ResponseStream>, Status>>;

    fn call(&mut self, request: Request<GetTagListRequest>) -> Self::Future {
        let service = self.service.clone();
        let chain = self.chain.clone();
        let (metadata, extensions, message) = request.into_parts();
        let context = server_context(STREAM_TAG_LIST_PATH, metadata, &extensions);

        Box::pin(async move {
            let handler = move |call: Call| {
                let service = service.clone();
                async move {
                    let (context, request) = call.into_parts::<GetTagListRequest>()?;
                    let stream = context
                        .run(service.stream_tag_list(context.clone(), request))
                        .await??;
                    Ok::<_, Status>(Reply::streaming(context.bound_stream(stream)))
                }
            };

            let reply = chain.run(Call::new(context, message), &handler).await?;
            Ok(Response::new(reply.into_streaming::<Tag>()?))
        })
    }
}

/// TagServiceClient calls tag.v1.TagService through the client chain.
#[derive(Clone)]
pub struct TagServiceClient {
    /// client is the grpc client of the tag service.
    client: tonic::client::Grpc<Channel>,

    /// chain is the client chain wrapping every outbound call.
    chain: Chain,
}

/// TagServiceClient implements the grpc client of the tag service.
impl TagServiceClient {
    /// new creates a client of the tag service at the address, the connection is
    /// established on the first call.
    pub fn new(addr: &str, chain: Chain) -> ClientResult<Self> {
        let channel = Channel::from_shared(addr.to_string())
            .map_err(|_| ClientError::InvalidURI(addr.into()))?
            .connect_timeout(super::CONNECT_TIMEOUT)
            .tcp_keepalive(Some(super::TCP_KEEPALIVE))
            .http2_keep_alive_interval(super::HTTP2_KEEP_ALIVE_INTERVAL)
            .keep_alive_timeout(super::HTTP2_KEEP_ALIVE_TIMEOUT)
            .connect_lazy();

        Ok(Self::with_channel(channel, chain))
    }

    /// with_channel creates a client of the tag service over the channel.
    pub fn with_channel(channel: Channel, chain: Chain) -> Self {
        Self {
            client: tonic::client::Grpc::new(channel),
            chain,
        }
    }

    /// get_tag_list calls GetTagList as a child call of the context.
    #[instrument(skip_all)]
    pub async fn get_tag_list(
        &self,
        context: &CallContext,
        request: GetTagListRequest,
    ) -> Result<GetTagListReply, Status> {
        let client = self.client.clone();
        let transport = move |call: Call| {
            let mut client = client.clone();
            async move {
                let (context, request) = call.into_parts::<GetTagListRequest>()?;
                let request = outbound_request(&context, request);
                let response = context
                    .run(async {
                        ready(&mut client).await?;
                        client
                            .unary(
                                request,
                                PathAndQuery::from_static(GET_TAG_LIST_PATH),
                                ProstCodec::<GetTagListRequest, GetTagListReply>::default(),
                            )
                            .await
                    })
                    .await??;

                Ok::<_, Status>(Reply::unary(response.into_inner()))
            }
        };

        self.chain
            .run(
                Call::new(context.child(GET_TAG_LIST_PATH), request),
                &transport,
            )
            .await?
            .into_unary::<GetTagListReply>()
    }

    /// stream_tag_list calls StreamTagList as a child call of the context, every
    /// message of the reply stream is bounded by the deadline of the call.
    #[instrument(skip_all)]
    pub async fn stream_tag_list(
        &self,
        context: &CallContext,
        request: GetTagListRequest,
    ) -> Result<TagStream, Status> {
        let client = self.client.clone();
        let transport = move |call: Call| {
            let mut client = client.clone();
            async move {
                let (context, request) = call.into_parts::<GetTagListRequest>()?;
                let request = outbound_request(&context, request);
                let response = context
                    .run(async {
                        ready(&mut client).await?;
                        client
                            .server_streaming(
                                request,
                                PathAndQuery::from_static(STREAM_TAG_LIST_PATH),
                                ProstCodec::<GetTagListRequest, Tag>::default(),
                            )
                            .await
                    })
                    .await??;

                Ok::<_, Status>(Reply::streaming(
                    context.bound_stream(response.into_inner().boxed()),
                ))
            }
        };

        self.chain
            .run(
                Call::new(context.child(STREAM_TAG_LIST_PATH), request),
                &transport,
            )
            .await?
            .into_streaming::<Tag>()
    }
}

/// ready waits for the channel to be ready to send a request.
async fn ready(client: &mut tonic::client::Grpc<Channel>) -> Result<(), Status> {
    client.ready().await.map_err(|err| {
        error!("tag service was not ready: {}", err);
        Status::unavailable("tag service was not ready")
    })
}

/// outbound_request creates the grpc request of an outbound call, the metadata
/// carries the trace context and the deadline is sent as grpc-timeout.
fn outbound_request<T>(context: &CallContext, message: T) -> Request<T> {
    let mut request = Request::new(message);
    *request.metadata_mut() = context.metadata().clone();
    if let Some(remaining) = context.remaining() {
        request.set_timeout(remaining);
    }

    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn server_context_reads_timeout_and_cancellation() {
        let mut metadata = tonic::metadata::MetadataMap::new();
        metadata.insert("grpc-timeout", "5S".parse().unwrap());
        let token = CancellationToken::new();
        let mut extensions = Extensions::new();
        extensions.insert(token.clone());

        let context = server_context(GET_TAG_LIST_PATH, metadata, &extensions);
        assert_eq!(context.method(), GET_TAG_LIST_PATH);
        assert_eq!(context.remaining(), Some(Duration::from_secs(5)));

        token.cancel();
        assert!(context.is_cancelled());
    }

    #[tokio::test]
    async fn server_context_without_timeout_has_no_deadline() {
        let context = server_context(
            GET_TAG_LIST_PATH,
            tonic::metadata::MetadataMap::new(),
            &Extensions::new(),
        );
        assert!(context.deadline().is_none());
        assert!(!context.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn outbound_request_sets_grpc_timeout() {
        let mut context =
            CallContext::new(GET_TAG_LIST_PATH).with_timeout(Duration::from_secs(60));
        context.metadata_mut().insert(
            "traceparent",
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01"
                .parse()
                .unwrap(),
        );

        let request = outbound_request(&context, GetTagListRequest::default());
        assert!(request.metadata().get("traceparent").is_some());
        assert!(request.metadata().get("grpc-timeout").is_some());
    }

    #[test]
    fn unimplemented_sets_grpc_status() {
        let response = unimplemented("/tag.v1.TagService/DeleteTag");
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()["grpc-status"], "12");
    }
}
