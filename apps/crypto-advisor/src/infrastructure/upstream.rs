//! Shared plumbing for upstream HTTP clients.

use std::time::Duration;

use reqwest::Response;
use reqwest::header::HeaderMap;
use tracing::Span;

use crate::application::ports::UpstreamError;
use crate::infrastructure::telemetry::TracePropagator;

/// Build a client with a per-request timeout.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| UpstreamError::Network(e.to_string()))
}

/// Transport failure. The URL is dropped since some carry credentials.
#[allow(clippy::needless_pass_by_value)]
pub fn network_error(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Network(err.without_url().to_string())
}

/// A response body read to completion, with its status and headers.
#[derive(Debug)]
pub struct UpstreamResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body text.
    pub body: String,
}

impl UpstreamResponse {
    /// Read `response` fully and record its status on the current span.
    pub async fn read(response: Response) -> Result<Self, UpstreamError> {
        let status = response.status().as_u16();
        Span::current().record("http.status_code", status);
        let headers = response.headers().clone();
        let body = response.text().await.map_err(network_error)?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }

    /// Fail with [`UpstreamError::BadStatus`] unless the status is 2xx.
    pub fn require_success(self) -> Result<Self, UpstreamError> {
        if (200..300).contains(&self.status) {
            Ok(self)
        } else {
            Err(UpstreamError::BadStatus {
                status: self.status,
                body: self.body,
            })
        }
    }

    /// Record the upstream's own trace context, if it sent one, as
    /// `remote.trace_id` / `remote.span_id` on the current span.
    pub fn record_remote_context(
        &self,
        propagator: &TracePropagator,
    ) -> Option<(String, String)> {
        let ids = propagator.remote_ids(&self.headers)?;
        let span = Span::current();
        span.record("remote.trace_id", ids.0.as_str());
        span.record("remote.span_id", ids.1.as_str());
        Some(ids)
    }

    /// Decode the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, UpstreamError> {
        serde_json::from_str(&self.body).map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }
}

/// Mark the current span failed and log `error`.
pub fn record_span_error(error: &UpstreamError) {
    let span = Span::current();
    span.record("otel.status_code", "ERROR");
    span.record("error.kind", error.kind().as_str());
    tracing::warn!(error = %error, "Upstream call failed");
}
