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

use opentelemetry::propagation::{Extractor, Injector, TextMapPropagator};
use opentelemetry::trace::{SpanKind, TraceContextExt, Tracer};
use opentelemetry::{Context, KeyValue};
use opentelemetry_sdk::propagation::TraceContextPropagator;
use opentelemetry_sdk::trace::SdkTracer;
use opentelemetry_semantic_conventions::attribute::{RPC_METHOD, RPC_SERVICE, RPC_SYSTEM};
use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;
use tonic::metadata::{KeyRef, MetadataKey, MetadataMap, MetadataValue};

/// COMPONENT_KEY is the attribute naming the component that created an rpc span.
pub const COMPONENT_KEY: &str = "component";

/// COMPONENT_GRPC is the component of every rpc span.
pub const COMPONENT_GRPC: &str = "gRPC";

/// Carrier ferries the trace context across a wire boundary in the metadata of a
/// call. A carrier over a shared borrow only extracts, a carrier over a mutable
/// borrow also injects, where writes to the same key overwrite each other.
pub struct Carrier<M>(M);

/// Carrier implements the carrier.
impl<M: Borrow<MetadataMap>> Carrier<M> {
    /// new creates a carrier over the metadata.
    pub fn new(metadata: M) -> Self {
        Self(metadata)
    }
}

/// Carrier implements the otel tracing Extractor.
impl<M: Borrow<MetadataMap>> Extractor for Carrier<M> {
    /// Gets a value for a key from the metadata. If the value can't be converted to &str, returns None
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .borrow()
            .get(key)
            .and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        collect_keys(self.0.borrow())
    }
}

/// Carrier implements the otel tracing Injector.
impl Injector for Carrier<&mut MetadataMap> {
    /// Sets a key-value pair to the metadata, invalid keys or values are skipped.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(key) = MetadataKey::from_bytes(key.as_bytes()) {
            if let Ok(value) = MetadataValue::try_from(&value) {
                self.0.insert(key, value);
            }
        }
    }
}

fn collect_keys(metadata: &MetadataMap) -> Vec<&str> {
    metadata
        .keys()
        .map(|key| match key {
            KeyRef::Ascii(v) => v.as_str(),
            KeyRef::Binary(v) => v.as_str(),
        })
        .collect::<Vec<_>>()
}

/// Propagator wraps the tracer of the process and the W3C trace context format.
/// It is created once at startup and handed to every component that starts,
/// injects or extracts spans.
#[derive(Clone)]
pub struct Propagator {
    tracer: Arc<SdkTracer>,
    format: Arc<TraceContextPropagator>,
}

/// Propagator implements Debug.
impl fmt::Debug for Propagator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Propagator").finish_non_exhaustive()
    }
}

/// Propagator implements the trace propagation.
impl Propagator {
    /// new creates a propagator over the tracer.
    pub fn new(tracer: SdkTracer) -> Self {
        Self {
            tracer: Arc::new(tracer),
            format: Arc::new(TraceContextPropagator::new()),
        }
    }

    /// start_span starts a span of the kind as a child of the span in the parent
    /// context, a root span when the parent holds none. The returned context holds
    /// the new span as its active span.
    pub fn start_span(
        &self,
        name: &str,
        kind: SpanKind,
        attributes: Vec<KeyValue>,
        parent: &Context,
    ) -> Context {
        let span = self
            .tracer
            .span_builder(name.to_string())
            .with_kind(kind)
            .with_attributes(attributes)
            .start_with_context(self.tracer.as_ref(), parent);

        parent.with_span(span)
    }

    /// inject writes the span context of the active span of the context into the
    /// metadata.
    pub fn inject(&self, context: &Context, metadata: &mut MetadataMap) {
        self.format
            .inject_context(context, &mut Carrier::new(metadata));
    }

    /// extract reads the span context from the metadata. A context without a
    /// remote span is returned when the metadata holds no trace keys.
    pub fn extract(&self, metadata: &MetadataMap) -> Context {
        self.format
            .extract_with_context(&Context::new(), &Carrier::new(metadata))
    }
}

/// rpc_attributes returns the attributes of a span of the method. The service and
/// method attributes are set when the method is a full grpc path such as
/// /tag.v1.TagService/GetTagList.
pub fn rpc_attributes(method: &str) -> Vec<KeyValue> {
    let mut attributes = vec![
        KeyValue::new(COMPONENT_KEY, COMPONENT_GRPC),
        KeyValue::new(RPC_SYSTEM, "grpc"),
    ];

    if let Some((service, name)) = method
        .strip_prefix('/')
        .and_then(|method| method.split_once('/'))
    {
        attributes.push(KeyValue::new(RPC_SERVICE, service.to_string()));
        attributes.push(KeyValue::new(RPC_METHOD, name.to_string()));
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TracerProvider;
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn test_propagator() -> (Propagator, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        (Propagator::new(provider.tracer("test")), exporter)
    }

    #[test]
    fn inject_then_extract_keeps_trace_id() {
        let (propagator, _) = test_propagator();
        let context = propagator.start_span(
            "/tag.v1.TagService/GetTagList",
            SpanKind::Client,
            vec![],
            &Context::new(),
        );

        let mut metadata = MetadataMap::new();
        propagator.inject(&context, &mut metadata);
        assert!(metadata.get("traceparent").is_some());

        let extracted = propagator.extract(&metadata);
        let extracted_span = extracted.span();
        let extracted_span_context = extracted_span.span_context();
        let span = context.span();
        assert!(extracted_span_context.is_remote());
        assert_eq!(
            extracted_span_context.trace_id(),
            span.span_context().trace_id()
        );
        assert_eq!(
            extracted_span_context.span_id(),
            span.span_context().span_id()
        );
    }

    #[test]
    fn extract_from_empty_metadata_yields_no_parent() {
        let (propagator, _) = test_propagator();
        let context = propagator.extract(&MetadataMap::new());
        assert!(!context.span().span_context().is_valid());
    }

    #[test]
    fn carrier_overwrites_existing_key() {
        let mut metadata = MetadataMap::new();
        let mut carrier = Carrier::new(&mut metadata);
        carrier.set("traceparent", "first".to_string());
        carrier.set("traceparent", "second".to_string());
        carrier.set("invalid key", "dropped".to_string());

        assert_eq!(Extractor::get(&carrier, "traceparent"), Some("second"));
        assert_eq!(carrier.keys(), vec!["traceparent"]);

        let reader = Carrier::new(&metadata);
        assert_eq!(reader.get("traceparent"), Some("second"));
        assert_eq!(reader.get("tracestate"), None);
    }

    #[test]
    fn start_span_without_parent_is_root() {
        let (propagator, exporter) = test_propagator();
        let context = propagator.start_span(
            "/tag.v1.TagService/GetTagList",
            SpanKind::Server,
            rpc_attributes("/tag.v1.TagService/GetTagList"),
            &Context::new(),
        );
        context.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(
            spans[0].parent_span_id,
            opentelemetry::trace::SpanId::INVALID
        );
        assert_eq!(spans[0].span_kind, SpanKind::Server);
        assert!(spans[0]
            .attributes
            .contains(&KeyValue::new(RPC_METHOD, "GetTagList")));
        assert!(spans[0]
            .attributes
            .contains(&KeyValue::new(COMPONENT_KEY, COMPONENT_GRPC)));
    }
}
