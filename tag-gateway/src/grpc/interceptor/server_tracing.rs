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

use super::{Call, Interceptor, Next, ObservedStream, Reply, SpanGuard};
use crate::tracing::propagator::{rpc_attributes, Propagator};
use futures::StreamExt;
use opentelemetry::trace::SpanKind;
use tonic::Status;

/// ServerTracing starts the server span of a call as a child of the span context
/// extracted from the inbound metadata, a root span when there is none. The span
/// is attached to the call context and ended on every exit path.
#[derive(Debug, Clone)]
pub struct ServerTracing {
    propagator: Propagator,
}

/// ServerTracing implements the server tracing interceptor.
impl ServerTracing {
    /// new creates the interceptor over the propagator.
    pub fn new(propagator: Propagator) -> Self {
        Self { propagator }
    }
}

#[tonic::async_trait]
impl Interceptor for ServerTracing {
    async fn intercept(&self, mut call: Call, next: Next<'_>) -> Result<Reply, Status> {
        let parent = self.propagator.extract(call.context.metadata());
        let context = self.propagator.start_span(
            call.method(),
            SpanKind::Server,
            rpc_attributes(call.method()),
            &parent,
        );
        call.context.set_trace_context(context.clone());

        let guard = SpanGuard::new(context);
        match next.run(call).await {
            Ok(Reply::Streaming(stream)) => {
                let observed = ObservedStream::new(stream, move |end| guard.finish_stream(end));
                Ok(Reply::Streaming(observed.boxed()))
            }
            Ok(reply) => {
                guard.finish(None);
                Ok(reply)
            }
            Err(status) => {
                guard.finish(Some(&status));
                Err(status)
            }
        }
    }
}
