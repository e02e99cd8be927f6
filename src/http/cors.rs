//! Permissive CORS headers present on every response.

use axum::http::{header, HeaderName, HeaderValue};
use tower_http::set_header::SetResponseHeaderLayer;

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "POST, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Layers that stamp the CORS headers onto a response unless the handler
/// already set them.
pub fn cors_header_layers() -> [SetResponseHeaderLayer<HeaderValue>; 3] {
    [
        layer(header::ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW_ORIGIN),
        layer(header::ACCESS_CONTROL_ALLOW_METHODS, ALLOW_METHODS),
        layer(header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOW_HEADERS),
    ]
}

fn layer(name: HeaderName, value: &'static str) -> SetResponseHeaderLayer<HeaderValue> {
    SetResponseHeaderLayer::if_not_present(name, HeaderValue::from_static(value))
}
