use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{IssuerError, IssuerResult};
use crate::issuer::AuthOutcome;

#[derive(Clone)]
pub struct IssuerMetrics {
    registry: Registry,
    request_outcomes: IntCounterVec,
    signals: IntCounterVec,
}

impl IssuerMetrics {
    pub fn new() -> IssuerResult<Self> {
        let registry = Registry::new();

        let request_outcomes = IntCounterVec::new(
            Opts::new(
                "auth_request_outcomes_total",
                "Inbound requests grouped by token outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(request_outcomes.clone()))?;

        let signals = IntCounterVec::new(
            Opts::new(
                "auth_token_signals_total",
                "Token signals written to responses",
            ),
            &["signal"],
        )?;
        registry.register(Box::new(signals.clone()))?;

        Ok(Self {
            registry,
            request_outcomes,
            signals,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn request_outcome(&self, outcome: &AuthOutcome) {
        self.request_outcomes
            .with_label_values(&[outcome.label()])
            .inc();
    }

    pub fn signal(&self, signal: &str) {
        self.signals.with_label_values(&[signal]).inc();
    }

    pub fn outcome_count(&self, label: &str) -> u64 {
        self.request_outcomes.with_label_values(&[label]).get()
    }

    pub fn render(&self) -> IssuerResult<Response> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            )
            .body(Body::from(buffer))
            .map_err(|err| IssuerError::Metrics(err.to_string()))
    }
}

impl From<prometheus::Error> for IssuerError {
    fn from(value: prometheus::Error) -> Self {
        Self::Metrics(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeFailure;

    #[test]
    fn counts_outcomes_by_label() {
        let metrics = IssuerMetrics::new().expect("metrics");
        metrics.request_outcome(&AuthOutcome::Anonymous);
        metrics.request_outcome(&AuthOutcome::Anonymous);
        metrics.request_outcome(&AuthOutcome::Rejected(DecodeFailure::Empty));
        assert_eq!(metrics.outcome_count("anonymous"), 2);
        assert_eq!(metrics.outcome_count("rejected"), 1);
        assert_eq!(metrics.outcome_count("renewed"), 0);
    }

    #[test]
    fn render_uses_text_exposition() {
        let metrics = IssuerMetrics::new().expect("metrics");
        metrics.signal("remove");
        let response = metrics.render().expect("render");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).expect("content type"),
            "text/plain; version=0.0.4"
        );
    }
}
