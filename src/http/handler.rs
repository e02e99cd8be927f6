//! JSON-RPC request handling.
//!
//! # Responsibilities
//! - Answer CORS preflights and refuse non-POST verbs
//! - Read the body under the request size limit
//! - Reject empty or non-UTF-8 bodies without touching the bridge
//! - Run the blocking bridge exchange off the async executor
//!
//! Transport problems use HTTP status codes (204, 400, 405). Everything the
//! bridge decides is reported as a JSON-RPC envelope with HTTP 200.

use std::sync::{Arc, Weak};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};

use crate::bridge::{envelope, error_envelope, extract_id_with_cap, Bridge, BridgeError, ErrorCode, IdToken};
use crate::observability::metrics;

pub const METHOD_NOT_ALLOWED_BODY: &str = "Method Not Allowed. Use POST for JSON-RPC requests.";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// The listener never keeps the bridge alive on its own.
    pub bridge: Weak<Bridge>,
    pub max_request_bytes: usize,
    pub max_id_len: usize,
}

impl AppState {
    pub fn new(bridge: &Arc<Bridge>) -> Self {
        let config = bridge.config();
        Self {
            bridge: Arc::downgrade(bridge),
            max_request_bytes: config.max_request_bytes,
            max_id_len: config.max_id_len,
        }
    }
}

pub async fn rpc_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let method = request.method().clone();

    if method == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }

    if method != Method::POST {
        tracing::debug!(method = %method, "Rejecting non-POST request");
        metrics::record_rejection("method_not_allowed");
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::CONTENT_TYPE, "text/plain")],
            METHOD_NOT_ALLOWED_BODY,
        )
            .into_response();
    }

    if declared_length(request.headers()).is_some_and(|len| len > state.max_request_bytes) {
        return too_large(state.max_request_bytes);
    }

    let bytes = match Limited::new(request.into_body(), state.max_request_bytes)
        .collect()
        .await
    {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.is::<LengthLimitError>() => return too_large(state.max_request_bytes),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to read request body");
            metrics::record_rejection("body_read_failed");
            return json(
                StatusCode::OK,
                error_envelope(ErrorCode::InternalError, envelope::BODY_READ_FAILED, &IdToken::Null),
            );
        }
    };

    if bytes.is_empty() {
        metrics::record_rejection("empty_body");
        return json(
            StatusCode::BAD_REQUEST,
            error_envelope(ErrorCode::ParseError, envelope::EMPTY_BODY, &IdToken::Null),
        );
    }

    let id = extract_id_with_cap(&bytes, state.max_id_len);
    let body = match String::from_utf8(bytes.to_vec()) {
        Ok(body) => body,
        Err(_) => {
            metrics::record_rejection("invalid_utf8");
            return json(
                StatusCode::OK,
                error_envelope(ErrorCode::ParseError, envelope::INVALID_UTF8, &id),
            );
        }
    };

    let Some(bridge) = state.bridge.upgrade() else {
        let err = BridgeError::ShuttingDown;
        return json(StatusCode::OK, error_envelope(err.code(), &err.to_string(), &id));
    };

    match tokio::task::spawn_blocking(move || bridge.handle_request(&body)).await {
        Ok(reply) => json(StatusCode::OK, reply),
        Err(err) => {
            tracing::error!(error = %err, id = %id, "Bridge task failed");
            json(
                StatusCode::OK,
                error_envelope(ErrorCode::InternalError, envelope::PROCESSING_FAILED, &id),
            )
        }
    }
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

fn too_large(limit: usize) -> Response {
    tracing::warn!(limit, "Request body exceeds limit");
    metrics::record_rejection("too_large");
    json(
        StatusCode::OK,
        error_envelope(ErrorCode::InvalidRequest, envelope::REQUEST_TOO_LARGE, &IdToken::Null),
    )
}

fn json(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/json")], body).into_response()
}
