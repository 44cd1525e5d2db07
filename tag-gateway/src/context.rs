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

use futures::stream::{self, BoxStream, Stream, StreamExt};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tonic::{metadata::MetadataMap, Status};

/// GRPC_TIMEOUT_HEADER is the header carrying the remaining time of a grpc call.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

/// CallContext is the explicit context of one call, threaded through every
/// interceptor and handler. It carries the method, the deadline, the metadata
/// used as the trace carrier, the trace context holding the active span and the
/// cancellation token of the call.
#[derive(Clone, Debug)]
pub struct CallContext {
    /// method is the full grpc path of the call.
    method: Arc<str>,

    /// started_at is the time the context was created.
    started_at: Instant,

    /// deadline is the absolute expiry of the call, set at most once.
    deadline: Option<Instant>,

    /// metadata is the inbound metadata on the server side and the outbound
    /// metadata on the client side.
    metadata: MetadataMap,

    /// trace is the opentelemetry context holding the active span of the call.
    trace: Context,

    /// cancellation is cancelled when the inbound connection goes away.
    cancellation: CancellationToken,
}

/// CallContext implements the call context.
impl CallContext {
    /// new creates a root context for the method without deadline or span.
    pub fn new(method: impl Into<Arc<str>>) -> Self {
        Self {
            method: method.into(),
            started_at: Instant::now(),
            deadline: None,
            metadata: MetadataMap::new(),
            trace: Context::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// child creates the context of an outbound call made while serving this
    /// call. The deadline and the span are inherited, the metadata is fresh and
    /// the cancellation token is a child of this one.
    pub fn child(&self, method: impl Into<Arc<str>>) -> Self {
        Self {
            method: method.into(),
            started_at: Instant::now(),
            deadline: self.deadline,
            metadata: MetadataMap::new(),
            trace: self.trace.clone(),
            cancellation: self.cancellation.child_token(),
        }
    }

    /// with_metadata replaces the metadata of the context.
    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// with_cancellation replaces the cancellation token of the context.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// with_trace_context replaces the trace context of the context.
    pub fn with_trace_context(mut self, trace: Context) -> Self {
        self.trace = trace;
        self
    }

    /// with_timeout sets the deadline to now + timeout unless a deadline is
    /// already present.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_deadline(Instant::now() + timeout);
        self
    }

    /// method returns the full grpc path of the call.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// started_at returns the time the context was created.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// deadline returns the deadline of the call.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// remaining returns the time left before the deadline, zero once it passed.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// set_deadline sets the deadline only if none is set, an existing deadline is
    /// never overwritten. Returns true if the deadline was set.
    pub fn set_deadline(&mut self, deadline: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }

        self.deadline = Some(deadline);
        true
    }

    /// metadata returns the metadata of the call.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// metadata_mut returns the mutable metadata of the call.
    pub fn metadata_mut(&mut self) -> &mut MetadataMap {
        &mut self.metadata
    }

    /// trace_context returns the trace context of the call.
    pub fn trace_context(&self) -> &Context {
        &self.trace
    }

    /// set_trace_context replaces the trace context of the call.
    pub fn set_trace_context(&mut self, trace: Context) {
        self.trace = trace;
    }

    /// has_span returns true if a span is active in the call.
    pub fn has_span(&self) -> bool {
        self.trace.has_active_span()
    }

    /// cancellation_token returns the cancellation token of the call.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// is_cancelled returns true if the call has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// run drives the future until it completes, the deadline elapses or the call
    /// is cancelled, whichever happens first.
    pub async fn run<F>(&self, future: F) -> Result<F::Output, Status>
    where
        F: Future,
    {
        let deadline = async {
            match self.deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            _ = self.cancellation.cancelled() => {
                Err(Status::cancelled(format!("call {} cancelled", self.method)))
            }
            _ = deadline => {
                Err(Status::deadline_exceeded(format!("call {} deadline exceeded", self.method)))
            }
            output = future => Ok(output),
        }
    }

    /// bound_stream bounds every item of the stream by the deadline and the
    /// cancellation of the call. The stream ends after the first error.
    pub fn bound_stream<S, T>(&self, stream: S) -> BoxStream<'static, Result<T, Status>>
    where
        S: Stream<Item = Result<T, Status>> + Send + Unpin + 'static,
        T: Send + 'static,
    {
        stream::unfold(Some((stream, self.clone())), |state| async move {
            let (mut stream, context) = state?;
            match context.run(stream.next()).await {
                Ok(Some(Ok(item))) => Some((Ok(item), Some((stream, context)))),
                Ok(Some(Err(status))) | Err(status) => Some((Err(status), None)),
                Ok(None) => None,
            }
        })
        .boxed()
    }
}

/// parse_grpc_timeout parses the value of the grpc-timeout header, an ASCII
/// integer of at most 8 digits followed by one of the units H, M, S, m, u or n.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let amount: u64 = digits.parse().ok()?;
    match unit {
        "H" => Some(Duration::from_secs(amount * 60 * 60)),
        "M" => Some(Duration::from_secs(amount * 60)),
        "S" => Some(Duration::from_secs(amount)),
        "m" => Some(Duration::from_millis(amount)),
        "u" => Some(Duration::from_micros(amount)),
        "n" => Some(Duration::from_nanos(amount)),
        _ => None,
    }
}

/// grpc_timeout_from_metadata returns the timeout carried by the metadata.
pub fn grpc_timeout_from_metadata(metadata: &MetadataMap) -> Option<Duration> {
    metadata
        .get(GRPC_TIMEOUT_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_grpc_timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_grpc_timeout("2M"), Some(Duration::from_secs(120)));
        assert_eq!(parse_grpc_timeout("60S"), Some(Duration::from_secs(60)));
        assert_eq!(parse_grpc_timeout("500m"), Some(Duration::from_millis(500)));
        assert_eq!(
            parse_grpc_timeout("59999999u"),
            Some(Duration::from_micros(59999999))
        );
        assert_eq!(parse_grpc_timeout("10n"), Some(Duration::from_nanos(10)));
    }

    #[test]
    fn parse_grpc_timeout_rejects_malformed_values() {
        assert_eq!(parse_grpc_timeout(""), None);
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("12x"), None);
        assert_eq!(parse_grpc_timeout("-1S"), None);
        assert_eq!(parse_grpc_timeout("1é"), None);
    }

    #[test]
    fn grpc_timeout_from_metadata_reads_header() {
        let mut metadata = MetadataMap::new();
        assert_eq!(grpc_timeout_from_metadata(&metadata), None);

        metadata.insert(GRPC_TIMEOUT_HEADER, "5S".parse().unwrap());
        assert_eq!(
            grpc_timeout_from_metadata(&metadata),
            Some(Duration::from_secs(5))
        );
    }

    #[tokio::test]
    async fn set_deadline_never_overwrites() {
        let mut context = CallContext::new("/tag.v1.TagService/GetTagList");
        assert!(context.deadline().is_none());

        let first = Instant::now() + Duration::from_secs(5);
        assert!(context.set_deadline(first));
        assert!(!context.set_deadline(first + Duration::from_secs(60)));
        assert_eq!(context.deadline(), Some(first));

        let context = context.with_timeout(Duration::from_secs(60));
        assert_eq!(context.deadline(), Some(first));
    }

    #[tokio::test]
    async fn child_inherits_deadline_and_cancellation() {
        let parent = CallContext::new("/tag.v1.TagService/GetTagList")
            .with_timeout(Duration::from_secs(5));
        let mut parent_metadata = parent.clone();
        parent_metadata
            .metadata_mut()
            .insert("x-request-id", "1".parse().unwrap());

        let child = parent_metadata.child("GET /api/v1/tags");
        assert_eq!(child.deadline(), parent.deadline());
        assert_eq!(child.method(), "GET /api/v1/tags");
        assert!(child.metadata().is_empty());

        parent_metadata.cancellation_token().cancel();
        assert!(child.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_deadline_exceeded_at_deadline() {
        let context = CallContext::new("/tag.v1.TagService/GetTagList")
            .with_timeout(Duration::from_secs(60));
        let started_at = Instant::now();

        let status = context
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::DeadlineExceeded);
        assert_eq!(started_at.elapsed(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn run_returns_cancelled_when_token_cancelled() {
        let context = CallContext::new("/tag.v1.TagService/GetTagList");
        context.cancellation_token().cancel();

        let status = context
            .run(std::future::pending::<()>())
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::Cancelled);
    }

    #[tokio::test]
    async fn run_returns_output_without_deadline() {
        let context = CallContext::new("/tag.v1.TagService/GetTagList");
        assert_eq!(context.run(async { 7 }).await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn bound_stream_ends_with_deadline_exceeded() {
        let context = CallContext::new("/tag.v1.TagService/StreamTagList")
            .with_timeout(Duration::from_secs(1));
        let source = stream::iter(vec![Ok::<_, Status>(1)]).chain(stream::pending());

        let items: Vec<Result<i32, Status>> = context.bound_stream(source.boxed()).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(*items[0].as_ref().unwrap(), 1);
        assert_eq!(
            items[1].as_ref().unwrap_err().code(),
            tonic::Code::DeadlineExceeded
        );
    }
}
