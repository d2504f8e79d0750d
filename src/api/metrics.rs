//! Prometheus metrics endpoint and HTTP request tracking middleware.

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

// Metric names as constants for consistency
pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const REGISTRATIONS_TOTAL: &str = "registrations_total";
pub const LOGINS_TOTAL: &str = "logins_total";
pub const EMAIL_VERIFICATIONS_TOTAL: &str = "email_verifications_total";
pub const USERS_TOTAL: &str = "users_total";
pub const PRODUCTS_TOTAL: &str = "products_total";
pub const ORDERS_TOTAL: &str = "orders_total";

/// Initialize the Prometheus metrics recorder and return a handle for
/// rendering metrics. Called once during startup.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(REGISTRATIONS_TOTAL, "Total number of user registrations");
    describe_counter!(LOGINS_TOTAL, "Total number of logins by outcome");
    describe_counter!(
        EMAIL_VERIFICATIONS_TOTAL,
        "Total number of completed email verifications"
    );
    describe_gauge!(USERS_TOTAL, "Total number of registered users");
    describe_gauge!(PRODUCTS_TOTAL, "Total number of catalog products");
    describe_gauge!(ORDERS_TOTAL, "Total number of orders");

    handle
}

/// GET /metrics - Returns Prometheus-formatted metrics.
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    update_gauge_metrics(&state).await;

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Update gauge metrics from current table counts.
async fn update_gauge_metrics(state: &AppState) {
    for (metric, table) in [
        (USERS_TOTAL, "users"),
        (PRODUCTS_TOTAL, "products"),
        (ORDERS_TOTAL, "orders"),
    ] {
        if let Ok(count) = sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&state.db)
            .await
        {
            gauge!(metric).set(count as f64);
        }
    }
}

/// Middleware to track HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Use the matched path so templates like /api/products/:id aggregate
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

/// Record a completed registration.
pub fn record_registration() {
    counter!(REGISTRATIONS_TOTAL).increment(1);
}

/// Record a successful login.
pub fn record_login() {
    counter!(LOGINS_TOTAL, "outcome" => "success").increment(1);
}

/// Record a rejected login attempt.
pub fn record_login_failure() {
    counter!(LOGINS_TOTAL, "outcome" => "failure").increment(1);
}

/// Record a completed email verification.
pub fn record_email_verification() {
    counter!(EMAIL_VERIFICATIONS_TOTAL).increment(1);
}
