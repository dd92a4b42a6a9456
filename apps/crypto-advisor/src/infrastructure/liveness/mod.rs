//! Liveness probe of the market data service: `GET <base>/health`.

use std::time::Duration;

use async_trait::async_trait;
use tracing::field;

use crate::application::ports::{LivenessPort, UpstreamError};
use crate::infrastructure::telemetry::TracePropagator;
use crate::infrastructure::upstream::{
    UpstreamResponse, build_client, network_error, record_span_error,
};

/// HTTP liveness probe. Healthy strictly iff the answer is 200.
#[derive(Debug, Clone)]
pub struct HttpLivenessProbe {
    client: reqwest::Client,
    health_url: String,
    propagator: TracePropagator,
}

impl HttpLivenessProbe {
    /// Probe `<base_url>/health`.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        propagator: TracePropagator,
    ) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: build_client(timeout)?,
            health_url: format!("{}/health", base_url.trim_end_matches('/')),
            propagator,
        })
    }

    async fn probe(&self) -> Result<(), UpstreamError> {
        let response = self
            .client
            .get(&self.health_url)
            .headers(self.propagator.outbound_headers())
            .send()
            .await
            .map_err(network_error)?;

        let response = UpstreamResponse::read(response).await?;
        response.record_remote_context(&self.propagator);
        if response.status == 200 {
            Ok(())
        } else {
            Err(UpstreamError::BadStatus {
                status: response.status,
                body: response.body,
            })
        }
    }
}

#[async_trait]
impl LivenessPort for HttpLivenessProbe {
    #[tracing::instrument(
        name = "liveness.check",
        skip(self),
        fields(
            url = %self.health_url,
            http.status_code = field::Empty,
            remote.trace_id = field::Empty,
            remote.span_id = field::Empty,
            error.kind = field::Empty,
            otel.status_code = field::Empty,
        )
    )]
    async fn check_liveness(&self) -> Result<(), UpstreamError> {
        self.probe().await.inspect_err(record_span_error)
    }
}
