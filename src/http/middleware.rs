//! Axum middleware that puts the admission gate in front of every route.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::gate::{AdmissionGate, Decision};
use crate::ratelimit::Admission;

/// Body sent with a 429.
pub const DENIED_BODY: &str =
    "you have reached the maximum number of requests or actions allowed within a certain time frame";

/// Body sent with a 500. Store details stay in the logs.
pub const ERROR_BODY: &str = "Internal server error";

/// Remote address used when the connection address is unavailable.
pub const UNKNOWN_REMOTE: &str = "unknown";

static LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Shared state for the admission middleware.
#[derive(Clone)]
pub struct GateState {
    gate: Arc<AdmissionGate>,
    credential_header: HeaderName,
}

impl GateState {
    pub fn new(gate: Arc<AdmissionGate>, credential_header: HeaderName) -> Self {
        Self {
            gate,
            credential_header,
        }
    }
}

/// Admit, reject with 429, or reject with 500 before the route handler runs.
pub async fn admission_middleware(
    State(state): State<GateState>,
    request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| UNKNOWN_REMOTE.to_string());
    let credential = request
        .headers()
        .get(&state.credential_header)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    match state.gate.evaluate(&remote, credential.as_deref()).await {
        Decision::Allowed(admission) => {
            let mut response = next.run(request).await;
            insert_limit_headers(response.headers_mut(), &admission);
            response
        }
        Decision::Denied(admission) => {
            let mut response = (StatusCode::TOO_MANY_REQUESTS, DENIED_BODY).into_response();
            insert_limit_headers(response.headers_mut(), &admission);
            response
        }
        Decision::Errored => (StatusCode::INTERNAL_SERVER_ERROR, ERROR_BODY).into_response(),
    }
}

fn insert_limit_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers.insert(LIMIT_HEADER.clone(), HeaderValue::from(admission.limit));
    headers.insert(REMAINING_HEADER.clone(), HeaderValue::from(admission.remaining()));
}
