//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for the JSON-RPC endpoint (any path)
//! - Wire up middleware (request ID, tracing, CORS, bearer auth)
//! - Serve a pre-bound listener, plain or TLS, until the handle shuts it down

use std::io;
use std::net::TcpListener;

use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::any,
    Router,
};
use axum_server::Handle;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::http::cors::cors_header_layers;
use crate::http::handler::{rpc_handler, AppState};
use crate::net::ServerTls;
use crate::security::{bearer_auth_middleware, AuthState};

/// HTTP front end of the bridge.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, auth: AuthState) -> Self {
        Self {
            router: build_router(state, auth),
        }
    }

    /// Serve until `handle` is told to shut down.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Option<ServerTls>,
        handle: Handle,
    ) -> Result<(), io::Error> {
        let addr = listener.local_addr()?;
        let app = self.router.into_make_service();

        match tls {
            #[cfg(feature = "tls")]
            Some(tls) => {
                tracing::info!(address = %addr, "HTTPS server starting");
                axum_server::tls_rustls::from_tcp_rustls(listener, tls)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
            #[cfg(not(feature = "tls"))]
            Some(never) => match never {},
            None => {
                tracing::info!(address = %addr, "HTTP server starting");
                axum_server::from_tcp(listener)
                    .handle(handle)
                    .serve(app)
                    .await?;
            }
        }

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
///
/// Layer order, outermost first: request id, trace, CORS headers,
/// request id propagation, bearer auth.
pub fn build_router(state: AppState, auth: AuthState) -> Router {
    let mut router = Router::new()
        .route("/", any(rpc_handler))
        .route("/{*path}", any(rpc_handler))
        .with_state(state)
        .layer(middleware::from_fn_with_state(auth, bearer_auth_middleware))
        .layer(PropagateRequestIdLayer::x_request_id());

    for layer in cors_header_layers() {
        router = router.layer(layer);
    }

    router
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "rpc",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
