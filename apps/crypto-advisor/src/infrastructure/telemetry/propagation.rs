//! W3C trace context propagation over HTTP headers.
//!
//! Outbound requests carry `traceparent`/`tracestate` and `baggage` for the
//! current span; inbound requests and upstream responses are read back into
//! an OpenTelemetry [`Context`].

use std::sync::Arc;

use opentelemetry::Context;
use opentelemetry::propagation::{
    Extractor, Injector, TextMapCompositePropagator, TextMapPropagator,
};
use opentelemetry::trace::TraceContextExt;
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// Writes propagation fields into a [`HeaderMap`].
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            return;
        };
        self.0.insert(name, value);
    }
}

/// Reads propagation fields from a [`HeaderMap`].
pub struct HeaderExtractor<'a>(pub &'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}

/// Trace context + baggage propagator, constructed once and shared.
#[derive(Clone)]
pub struct TracePropagator {
    inner: Arc<TextMapCompositePropagator>,
}

impl Default for TracePropagator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TracePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracePropagator").finish_non_exhaustive()
    }
}

impl TracePropagator {
    /// W3C `traceparent`/`tracestate` plus `baggage`.
    #[must_use]
    pub fn new() -> Self {
        let composite = TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
        ]);
        Self {
            inner: Arc::new(composite),
        }
    }

    /// Inject `cx` into `headers`.
    pub fn inject_context(&self, cx: &Context, headers: &mut HeaderMap) {
        self.inner.inject_context(cx, &mut HeaderInjector(headers));
    }

    /// Inject the context of the current `tracing` span.
    ///
    /// Adds nothing when no OpenTelemetry layer is installed.
    pub fn inject_current(&self, headers: &mut HeaderMap) {
        let cx = tracing::Span::current().context();
        self.inject_context(&cx, headers);
    }

    /// Headers carrying the current span context, for an outbound request.
    #[must_use]
    pub fn outbound_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.inject_current(&mut headers);
        headers
    }

    /// Extract a context from `headers`; empty when none is present.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap) -> Context {
        self.inner
            .extract_with_context(&Context::new(), &HeaderExtractor(headers))
    }

    /// Make the context found in `headers` the parent of `span`.
    pub fn set_parent_from(&self, span: &tracing::Span, headers: &HeaderMap) {
        let cx = self.extract(headers);
        if cx.span().span_context().is_valid() {
            let _ = span.set_parent(cx);
        }
    }

    /// Hex trace and span ids of a remote context in `headers`, if valid.
    #[must_use]
    pub fn remote_ids(&self, headers: &HeaderMap) -> Option<(String, String)> {
        let cx = self.extract(headers);
        let span = cx.span();
        let sc = span.span_context();
        sc.is_valid()
            .then(|| (sc.trace_id().to_string(), sc.span_id().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    const TRACE_ID: [u8; 16] = [
        0x4b, 0xf9, 0x2f, 0x35, 0x77, 0xb3, 0x4d, 0xa6, 0xa3, 0xce, 0x92, 0x9d, 0x0e, 0x0e, 0x47,
        0x36,
    ];
    const SPAN_ID: [u8; 8] = [0x00, 0xf0, 0x67, 0xaa, 0x0b, 0xa9, 0x02, 0xb7];

    fn remote_context() -> Context {
        let sc = SpanContext::new(
            TraceId::from_bytes(TRACE_ID),
            SpanId::from_bytes(SPAN_ID),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(sc)
    }

    #[test]
    fn injects_w3c_traceparent() {
        let propagator = TracePropagator::new();
        let mut headers = HeaderMap::new();
        propagator.inject_context(&remote_context(), &mut headers);

        assert_eq!(
            headers.get("traceparent").and_then(|v| v.to_str().ok()),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
    }

    #[test]
    fn extracts_remote_ids() {
        let propagator = TracePropagator::new();
        let mut headers = HeaderMap::new();
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );

        let (trace_id, span_id) = propagator.remote_ids(&headers).unwrap();
        assert_eq!(trace_id, "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(span_id, "00f067aa0ba902b7");
    }

    #[test]
    fn missing_or_malformed_headers_yield_nothing() {
        let propagator = TracePropagator::new();
        assert!(propagator.remote_ids(&HeaderMap::new()).is_none());

        let mut headers = HeaderMap::new();
        headers.insert("traceparent", HeaderValue::from_static("garbage"));
        assert!(propagator.remote_ids(&headers).is_none());
    }

    #[test]
    fn empty_context_injects_no_traceparent() {
        let propagator = TracePropagator::new();
        let mut headers = HeaderMap::new();
        propagator.inject_context(&Context::new(), &mut headers);
        assert!(headers.get("traceparent").is_none());
    }

    #[test]
    fn current_span_without_otel_layer_is_harmless() {
        let propagator = TracePropagator::new();
        assert!(propagator.outbound_headers().get("traceparent").is_none());
    }
}
