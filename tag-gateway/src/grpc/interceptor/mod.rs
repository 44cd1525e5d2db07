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

use crate::context::CallContext;
use crate::tracing::Propagator;
use futures::stream::{BoxStream, Stream, StreamExt};
use opentelemetry::trace::{Status as SpanStatus, TraceContextExt};
use opentelemetry::{Context, KeyValue};
use opentelemetry_semantic_conventions::attribute::RPC_GRPC_STATUS_CODE;
use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;
use tonic::{Code, Status};

pub mod access_log;
pub mod client_tracing;
pub mod deadline;
pub mod error_log;
pub mod recovery;
pub mod server_tracing;

pub use access_log::AccessLog;
pub use client_tracing::ClientTracing;
pub use deadline::DefaultDeadline;
pub use error_log::ErrorLog;
pub use recovery::Recovery;
pub use server_tracing::ServerTracing;

/// Message is a type erased request or reply message, interceptors never look
/// into the payload.
pub type Message = Box<dyn Any + Send>;

/// MessageStream is the type erased stream of reply messages of a streaming call.
pub type MessageStream = BoxStream<'static, Result<Message, Status>>;

/// Call is one unary exchange or one streaming session passing through a chain.
pub struct Call {
    /// context is the call context, interceptors may attach spans and deadlines.
    pub context: CallContext,

    /// request is the request message of the call.
    pub request: Message,
}

/// Call implements the call.
impl Call {
    /// new creates a call of the request.
    pub fn new<T: Send + 'static>(context: CallContext, request: T) -> Self {
        Self {
            context,
            request: Box::new(request),
        }
    }

    /// method returns the full grpc path of the call.
    pub fn method(&self) -> &str {
        self.context.method()
    }

    /// into_parts returns the context and the typed request of the call.
    pub fn into_parts<T: 'static>(self) -> Result<(CallContext, T), Status> {
        let request = self.request.downcast::<T>().map_err(|_| {
            Status::internal(format!(
                "unexpected request message type of {}",
                self.context.method()
            ))
        })?;

        Ok((self.context, *request))
    }
}

/// Reply is the result of a call, one message for a unary call and a stream of
/// messages for a streaming call.
pub enum Reply {
    Unary(Message),
    Streaming(MessageStream),
}

/// Reply implements the conversion from and to typed replies.
impl Reply {
    /// unary creates the reply of a unary call.
    pub fn unary<T: Send + 'static>(message: T) -> Self {
        Reply::Unary(Box::new(message))
    }

    /// streaming creates the reply of a streaming call.
    pub fn streaming<S, T>(stream: S) -> Self
    where
        S: Stream<Item = Result<T, Status>> + Send + 'static,
        T: Send + 'static,
    {
        Reply::Streaming(
            stream
                .map(|item| item.map(|message| Box::new(message) as Message))
                .boxed(),
        )
    }

    /// into_unary returns the typed message of a unary reply.
    pub fn into_unary<T: 'static>(self) -> Result<T, Status> {
        match self {
            Reply::Unary(message) => message
                .downcast::<T>()
                .map(|message| *message)
                .map_err(|_| Status::internal("unexpected reply message type")),
            Reply::Streaming(_) => Err(Status::internal("unexpected streaming reply")),
        }
    }

    /// into_streaming returns the typed message stream of a streaming reply.
    pub fn into_streaming<T: Send + 'static>(
        self,
    ) -> Result<BoxStream<'static, Result<T, Status>>, Status> {
        match self {
            Reply::Streaming(stream) => Ok(stream
                .map(|item| {
                    item.and_then(|message| {
                        message
                            .downcast::<T>()
                            .map(|message| *message)
                            .map_err(|_| Status::internal("unexpected stream message type"))
                    })
                })
                .boxed()),
            Reply::Unary(_) => Err(Status::internal("unexpected unary reply")),
        }
    }
}

/// Interceptor wraps the remainder of a chain with one cross-cutting concern. The
/// same capability serves unary and streaming calls, a streaming interceptor
/// observes the reply stream by wrapping it.
#[tonic::async_trait]
pub trait Interceptor: Send + Sync + 'static {
    /// intercept handles the call, next runs the remainder of the chain.
    async fn intercept(&self, call: Call, next: Next<'_>) -> Result<Reply, Status>;
}

/// Endpoint is the innermost step of a chain, the handler on the server side and
/// the transport on the client side.
#[tonic::async_trait]
pub trait Endpoint: Send + Sync {
    async fn call(&self, call: Call) -> Result<Reply, Status>;
}

#[tonic::async_trait]
impl<F, Fut> Endpoint for F
where
    F: Fn(Call) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Reply, Status>> + Send + 'static,
{
    async fn call(&self, call: Call) -> Result<Reply, Status> {
        (self)(call).await
    }
}

/// Next is the remainder of a chain as seen by an interceptor.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    interceptors: &'a [Arc<dyn Interceptor>],
    endpoint: &'a dyn Endpoint,
}

/// Next implements the walk of the chain.
impl<'a> Next<'a> {
    fn new(interceptors: &'a [Arc<dyn Interceptor>], endpoint: &'a dyn Endpoint) -> Self {
        Self {
            interceptors,
            endpoint,
        }
    }

    /// run runs the next interceptor, or the endpoint at the end of the chain.
    pub async fn run(self, call: Call) -> Result<Reply, Status> {
        match self.interceptors.split_first() {
            Some((current, rest)) => {
                current
                    .intercept(call, Next::new(rest, self.endpoint))
                    .await
            }
            None => self.endpoint.call(call).await,
        }
    }
}

/// Chain is an ordered list of interceptors, the first one is the outermost. The
/// list is built once and shared by every call.
#[derive(Clone)]
pub struct Chain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

/// Chain implements Default.
impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

/// Chain implements the interceptor chain.
impl Chain {
    /// new creates an empty chain, running it calls the endpoint directly.
    pub fn new() -> Self {
        Self {
            interceptors: Vec::new().into(),
        }
    }

    /// server creates the chain wrapping every served call, outermost first:
    /// access log, error log, recovery and server tracing.
    pub fn server(propagator: Propagator) -> Self {
        Self::new()
            .with(AccessLog)
            .with(ErrorLog)
            .with(Recovery)
            .with(ServerTracing::new(propagator))
    }

    /// client creates the chain wrapping every outbound call, client tracing then
    /// deadline defaulting.
    pub fn client(propagator: Propagator, default_timeout: Duration) -> Self {
        Self::new()
            .with(ClientTracing::new(propagator))
            .with(DefaultDeadline::new(default_timeout))
    }

    /// with appends the interceptor as the innermost one.
    pub fn with<I: Interceptor>(self, interceptor: I) -> Self {
        let mut interceptors = self.interceptors.to_vec();
        interceptors.push(Arc::new(interceptor));
        Self {
            interceptors: interceptors.into(),
        }
    }

    /// then returns the chain running self around inner, a.then(b).then(c) and
    /// a.then(b.then(c)) run the same interceptors in the same order.
    pub fn then(&self, inner: &Chain) -> Self {
        Self {
            interceptors: self
                .interceptors
                .iter()
                .chain(inner.interceptors.iter())
                .cloned()
                .collect::<Vec<_>>()
                .into(),
        }
    }

    /// len returns the number of interceptors.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// is_empty returns true if the chain holds no interceptor.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// run runs the call through the chain and the endpoint.
    pub async fn run(&self, call: Call, endpoint: &dyn Endpoint) -> Result<Reply, Status> {
        Next::new(&self.interceptors, endpoint).run(call).await
    }
}

/// StreamEnd is how a reply stream terminated.
#[derive(Debug)]
pub enum StreamEnd<'a> {
    /// Completed is the end of the stream without error.
    Completed,

    /// Failed is the first error of the stream.
    Failed(&'a Status),

    /// Dropped is the stream dropped before its end, such as a cancelled call.
    Dropped,
}

type OnEnd = Box<dyn FnOnce(StreamEnd<'_>) + Send>;

/// ObservedStream passes the items of a reply stream through and calls the
/// callback exactly once when the stream completes, fails or is dropped.
pub struct ObservedStream {
    inner: MessageStream,
    on_end: Option<OnEnd>,
}

/// ObservedStream implements the observed stream.
impl ObservedStream {
    /// new wraps the stream with the callback.
    pub fn new<F>(inner: MessageStream, on_end: F) -> Self
    where
        F: FnOnce(StreamEnd<'_>) + Send + 'static,
    {
        Self {
            inner,
            on_end: Some(Box::new(on_end)),
        }
    }

    fn finish(&mut self, end: StreamEnd<'_>) {
        if let Some(on_end) = self.on_end.take() {
            on_end(end);
        }
    }
}

/// ObservedStream implements Stream.
impl Stream for ObservedStream {
    type Item = Result<Message, Status>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                this.finish(StreamEnd::Completed);
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(status))) => {
                this.finish(StreamEnd::Failed(&status));
                Poll::Ready(Some(Err(status)))
            }
            other => other,
        }
    }
}

/// ObservedStream implements Drop.
impl Drop for ObservedStream {
    fn drop(&mut self) {
        self.finish(StreamEnd::Dropped);
    }
}

/// SpanGuard ends the span of a call exactly once. Dropping the guard without
/// finishing it, on panic or cancellation, ends the span with an error status.
pub(crate) struct SpanGuard {
    context: Context,
    ended: bool,
}

/// SpanGuard implements the span guard.
impl SpanGuard {
    pub(crate) fn new(context: Context) -> Self {
        Self {
            context,
            ended: false,
        }
    }

    /// finish records the result of the call on the span and ends it.
    pub(crate) fn finish(mut self, status: Option<&Status>) {
        let span = self.context.span();
        match status {
            Some(status) => {
                span.set_attribute(KeyValue::new(
                    RPC_GRPC_STATUS_CODE,
                    status.code() as i64,
                ));
                span.set_status(SpanStatus::error(status.message().to_string()));
            }
            None => {
                span.set_attribute(KeyValue::new(
                    RPC_GRPC_STATUS_CODE,
                    Code::Ok as i64,
                ));
                span.set_status(SpanStatus::Ok);
            }
        }

        span.end();
        self.ended = true;
    }

    /// finish_stream finishes the span of a streaming call when its reply stream
    /// terminates.
    pub(crate) fn finish_stream(self, end: StreamEnd<'_>) {
        match end {
            StreamEnd::Completed => self.finish(None),
            StreamEnd::Failed(status) => self.finish(Some(status)),
            StreamEnd::Dropped => drop(self),
        }
    }
}

/// SpanGuard implements Drop.
impl Drop for SpanGuard {
    fn drop(&mut self) {
        if !self.ended {
            let span = self.context.span();
            span.set_status(SpanStatus::error("call aborted"));
            span.end();
        }
    }
}
