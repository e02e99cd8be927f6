//! JSON-RPC error envelopes synthesized by the proxy itself.

use serde::Serialize;
use serde_json::value::RawValue;

use crate::bridge::id::IdToken;

pub const JSONRPC_VERSION: &str = "2.0";

pub const EMPTY_BODY: &str = "Parse error: Empty request body.";
pub const INVALID_UTF8: &str = "Parse error: Request body is not valid UTF-8.";
pub const REQUEST_TOO_LARGE: &str = "Request too large";
pub const BODY_READ_FAILED: &str = "Internal error: failed to read request body";
pub const PROCESSING_FAILED: &str = "Internal error: request processing failed";
pub const RESPONSE_TOO_LARGE: &str = "Internal error: Response too large";
pub const EMPTY_RESPONSE: &str = "Internal error: Host produced an empty response";

// Used only if serialization itself fails.
const FALLBACK: &str =
    r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"},"id":null}"#;

/// JSON-RPC error codes the proxy emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    InternalError,
    /// Host unavailable, timed out, shutting down or interrupted by a reset.
    ServerError,
}

impl ErrorCode {
    pub fn code(self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError => -32000,
        }
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    jsonrpc: &'static str,
    error: ErrorObject<'a>,
    id: &'a RawValue,
}

#[derive(Serialize)]
struct ErrorObject<'a> {
    code: i64,
    message: &'a str,
}

/// Build `{"jsonrpc":"2.0","error":{"code":..,"message":..},"id":..}`.
///
/// The id is echoed verbatim when it is valid JSON, otherwise `null`.
pub fn error_envelope(code: ErrorCode, message: &str, id: &IdToken) -> String {
    let raw_id = RawValue::from_string(id.as_json().to_owned())
        .or_else(|_| RawValue::from_string("null".to_owned()));
    let Ok(raw_id) = raw_id else {
        return FALLBACK.to_owned();
    };

    let envelope = ErrorEnvelope {
        jsonrpc: JSONRPC_VERSION,
        error: ErrorObject {
            code: code.code(),
            message,
        },
        id: &*raw_id,
    };
    serde_json::to_string(&envelope).unwrap_or_else(|_| FALLBACK.to_owned())
}
