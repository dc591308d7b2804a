//! Prometheus metrics for Millwright
//!
//! Exposes metrics at `/metrics` endpoint in Prometheus format.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use millwright_auth::AuthError;
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Metric names
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "millwright_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "millwright_http_request_duration_seconds";

    // Login metrics
    pub const LOGIN_ATTEMPTS_TOTAL: &str = "millwright_login_attempts_total";
    pub const LOGIN_DURATION_SECONDS: &str = "millwright_login_duration_seconds";

    // System metrics
    pub const UPTIME_SECONDS: &str = "millwright_uptime_seconds";
    pub const INFO: &str = "millwright_info";
}

/// Outcome label of a login attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    Rejected,
    DirectoryUnavailable,
    SessionError,
}

impl LoginOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::DirectoryUnavailable => "directory_unavailable",
            Self::SessionError => "session_error",
        }
    }
}

impl From<&AuthError> for LoginOutcome {
    fn from(err: &AuthError) -> Self {
        match err {
            AuthError::Authentication => Self::Rejected,
            AuthError::DirectoryUnavailable(_) | AuthError::Config(_) => {
                Self::DirectoryUnavailable
            }
            AuthError::SessionWrite(_) => Self::SessionError,
        }
    }
}

pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Install the Prometheus recorder as the global metrics recorder
    pub fn install() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        // Set initial info metric
        gauge!(names::INFO, "version" => millwright_core::VERSION).set(1.0);

        Ok(Self {
            handle,
            start_time: Instant::now(),
        })
    }

    /// Recorder that is not installed globally; renders nothing
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
            start_time: Instant::now(),
        }
    }

    /// Get metrics output in Prometheus format
    pub fn render(&self) -> String {
        // Update uptime
        gauge!(names::UPTIME_SECONDS).set(self.start_time.elapsed().as_secs_f64());

        self.handle.render()
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        let status_class = format!("{}xx", status / 100);

        counter!(
            names::HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status_str,
            "status_class" => status_class
        )
        .increment(1);

        histogram!(
            names::HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string()
        )
        .record(duration_secs);
    }

    /// Record a login attempt
    pub fn record_login(&self, outcome: LoginOutcome, duration_secs: f64) {
        counter!(names::LOGIN_ATTEMPTS_TOTAL, "outcome" => outcome.as_str()).increment(1);
        histogram!(names::LOGIN_DURATION_SECONDS).record(duration_secs);
    }
}

/// Axum middleware for recording HTTP metrics
pub async fn metrics_middleware(
    State(metrics): State<Arc<MetricsRecorder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    metrics.record_http_request(&method, status, duration);

    debug!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(metrics): State<Arc<MetricsRecorder>>) -> impl IntoResponse {
    let output = metrics.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_outcome_labels() {
        assert_eq!(
            LoginOutcome::from(&AuthError::Authentication),
            LoginOutcome::Rejected
        );
        assert_eq!(
            LoginOutcome::from(&AuthError::DirectoryUnavailable("down".into())),
            LoginOutcome::DirectoryUnavailable
        );
        assert_eq!(
            LoginOutcome::from(&AuthError::SessionWrite("store".into())).as_str(),
            "session_error"
        );
        assert_eq!(LoginOutcome::Success.as_str(), "success");
    }

    #[test]
    fn test_detached_recorder_renders() {
        let metrics = MetricsRecorder::detached();
        metrics.record_login(LoginOutcome::Success, 0.01);
        // not installed globally, so nothing is collected
        assert!(!metrics.render().contains(names::LOGIN_ATTEMPTS_TOTAL));
    }
}
