//! Bearer-token enforcement.
//!
//! # Responsibilities
//! - Compare the whole `Authorization` header against `Bearer <key>`
//! - Reject mismatches with 401 and an empty body before the bridge sees them
//!
//! # Design Decisions
//! - CORS preflights (`OPTIONS`) pass through so browsers can discover the
//!   endpoint; they never reach the bridge anyway
//! - Comparison runs in constant time over the longer of the two inputs

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::observability::metrics;

#[derive(Clone, Default)]
pub struct AuthState {
    /// Full expected header value, `None` when auth is disabled.
    expected: Option<Arc<str>>,
}

impl AuthState {
    pub fn new(api_key: &str) -> Self {
        Self {
            expected: (!api_key.is_empty()).then(|| Arc::from(format!("Bearer {api_key}"))),
        }
    }

    pub fn enabled(&self) -> bool {
        self.expected.is_some()
    }

    /// Whether a request with this `Authorization` value may proceed.
    pub fn permits(&self, authorization: Option<&[u8]>) -> bool {
        match &self.expected {
            None => true,
            Some(expected) => {
                authorization.is_some_and(|given| constant_time_eq(given, expected.as_bytes()))
            }
        }
    }
}

pub async fn bearer_auth_middleware(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .map(|value| value.as_bytes());

    if auth.permits(authorization) {
        return next.run(request).await;
    }

    tracing::warn!(
        method = %request.method(),
        has_header = authorization.is_some(),
        "Rejected request with missing or invalid bearer token"
    );
    metrics::record_rejection("unauthorized");
    StatusCode::UNAUTHORIZED.into_response()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let mut diff = u64::try_from(a.len() ^ b.len()).unwrap_or(u64::MAX);
    for i in 0..a.len().max(b.len()) {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        diff |= u64::from(x ^ y);
    }
    diff == 0
}
