//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use reload_proxy::bridge::{Bridge, IncomingRequest};
use reload_proxy::config::{DeliveryStrategy, ProxyConfig};
use reload_proxy::ProxyServer;

pub const PING: &str = r#"{"jsonrpc":"2.0","method":"ping","id":1}"#;
pub const PONG: &str = r#"{"jsonrpc":"2.0","result":"pong","id":1}"#;

/// Config with a short request timeout so failure paths finish quickly.
pub fn config(strategy: DeliveryStrategy, timeout_ms: u64) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.bridge.strategy = strategy;
    config.bridge.request_timeout_ms = timeout_ms;
    config.lifecycle.shutdown_grace_ms = 500;
    config
}

/// Start a server on an ephemeral loopback port.
pub fn start(config: ProxyConfig) -> (ProxyServer, SocketAddr) {
    let server = ProxyServer::new(config);
    let addr = server.start_on(0).expect("server should start").local_addr();
    (server, addr)
}

pub fn url(addr: SocketAddr) -> String {
    format!("http://{}/", addr)
}

/// HTTP client that never reuses connections, so stopping the server is
/// never held up by idle keep-alives.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(30))
        .build()
        .expect("client should build")
}

pub async fn post(addr: SocketAddr, body: &'static str) -> (u16, String) {
    let res = client()
        .post(url(addr))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("request should complete");
    let status = res.status().as_u16();
    (status, res.text().await.expect("body should be readable"))
}

pub fn error_code(body: &str) -> i64 {
    let value: serde_json::Value = serde_json::from_str(body).expect("body should be JSON");
    value["error"]["code"].as_i64().expect("body should carry an error code")
}

/// A polling host on its own thread answering every request with `reply`.
pub struct PollingHost {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl PollingHost {
    pub fn spawn(bridge: Arc<Bridge>, reply: fn(&IncomingRequest) -> String) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        bridge.set_ready(true);
        let thread = thread::spawn(move || {
            while flag.load(Ordering::SeqCst) {
                if let Some(request) = bridge.wait_for_request(Duration::from_millis(20)) {
                    let body = reply(&request);
                    request.respond(body);
                }
            }
        });
        Self {
            running,
            thread: Some(thread),
        }
    }
}

impl Drop for PollingHost {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

pub fn pong(_: &IncomingRequest) -> String {
    PONG.to_string()
}

/// Wait until the bridge has a request parked, or panic after a few seconds.
pub fn wait_for_pending(bridge: &Bridge) -> IncomingRequest {
    bridge
        .wait_for_request(Duration::from_secs(5))
        .expect("a request should reach the host")
}
