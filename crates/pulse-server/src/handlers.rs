use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::client_ip::ClientIdentity;
use crate::error::ApiError;
use crate::limiter::{LIST_ROUTE, SUBMIT_ROUTE};
use crate::server::AppState;

fn record_request(state: &AppState, route: &str, status: StatusCode) {
    if let Some(metrics) = state.orchestrator.metrics() {
        metrics.counter_inc(
            "http_requests_total",
            &[("route", route), ("status", status.as_str())],
            1,
        );
    }
}

fn respond<T: serde::Serialize>(
    state: &AppState,
    route: &str,
    success: StatusCode,
    result: Result<T, ApiError>,
) -> Response {
    match result {
        Ok(data) => {
            record_request(state, route, success);
            (success, Json(json!({ "data": data }))).into_response()
        }
        Err(err) => {
            record_request(state, route, err.status());
            err.into_response()
        }
    }
}

/// `GET /reviews`
pub async fn list_reviews(
    State(state): State<AppState>,
    client: ClientIdentity,
    headers: HeaderMap,
) -> Response {
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let result = state.orchestrator.list(client.as_str(), authorization);
    respond(&state, LIST_ROUTE, StatusCode::OK, result)
}

/// `POST /reviews`
pub async fn submit_review(
    State(state): State<AppState>,
    client: ClientIdentity,
    body: Bytes,
) -> Response {
    let result = state.orchestrator.submit(client.as_str(), &body).await;
    respond(&state, SUBMIT_ROUTE, StatusCode::CREATED, result)
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    let metrics = orchestrator
        .metrics()
        .map(|m| serde_json::to_value(m.snapshot()).unwrap_or_default())
        .unwrap_or_else(|| json!({}));

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "generatorConfigured": orchestrator.generator_configured(),
        "adminAuth": orchestrator.admin_auth_enabled(),
        "rateLimitBuckets": orchestrator.limiter().tracked_keys(),
        "metrics": metrics,
    }))
}
