//! Reload-safe JSON-RPC proxy (demo host)
//!
//! Starts the proxy and answers calls from a small in-process host that can
//! periodically pretend to reset, to exercise the reload path end to end.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │               RELOAD PROXY                   │
//!  Client Request     │  ┌─────────┐   ┌─────────┐   ┌────────────┐  │
//!  ───────────────────┼─▶│   net   │──▶│  http   │──▶│   bridge   │  │
//!                     │  │listener │   │ handler │   │  mailbox   │  │
//!                     │  └─────────┘   └─────────┘   └─────┬──────┘  │
//!                     │                                    │         │
//!  Client Response    │                                    ▼         │
//!  ◀──────────────────┼──────── JSON-RPC envelope ◀── host consumer  │
//!                     │                               (this binary)  │
//!                     │  config · security · lifecycle · observability│
//!                     └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde_json::{json, Value};

use reload_proxy::bridge::{Bridge, IncomingRequest};
use reload_proxy::config::{load_config, DeliveryStrategy, ProxyConfig};
use reload_proxy::observability::{logging, metrics};
use reload_proxy::ProxyServer;

#[derive(Parser)]
#[command(name = "reload-proxy")]
#[command(about = "Reload-safe HTTP/JSON-RPC proxy with a demo echo host", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the bind address
    #[arg(long)]
    bind: Option<String>,

    /// Override the delivery strategy (callback or polling)
    #[arg(long, value_parser = parse_strategy)]
    strategy: Option<DeliveryStrategy>,

    /// Require `Authorization: Bearer <key>`
    #[arg(long)]
    api_key: Option<String>,

    /// Simulate a host reset every N seconds
    #[arg(long)]
    reset_every: Option<u64>,

    /// How long each simulated reset keeps the host unavailable
    #[arg(long, default_value_t = 2000)]
    reset_ms: u64,
}

fn parse_strategy(value: &str) -> Result<DeliveryStrategy, String> {
    match value {
        "callback" => Ok(DeliveryStrategy::Callback),
        "polling" => Ok(DeliveryStrategy::Polling),
        other => Err(format!("unknown strategy '{other}', expected callback or polling")),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(strategy) = cli.strategy {
        config.bridge.strategy = strategy;
    }
    if let Some(key) = cli.api_key {
        config.security.api_key = key;
    }

    logging::init(&config.observability.log_level);
    tracing::info!(version = reload_proxy::lifecycle::version(), "reload-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let strategy = config.bridge.strategy;
    let server = ProxyServer::from_config(config)?;
    let addr = server.start()?.local_addr();
    tracing::info!(address = %addr, strategy = %strategy, "Listening for JSON-RPC calls");

    let bridge = server.bridge();
    let running = Arc::new(AtomicBool::new(true));
    let host = Host::attach(&bridge, strategy);

    let reset_thread = cli.reset_every.map(|every| {
        let bridge = Arc::clone(&bridge);
        let running = Arc::clone(&running);
        let outage = Duration::from_millis(cli.reset_ms);
        thread::spawn(move || simulate_resets(&bridge, strategy, every, outage, &running))
    });
    let poll_thread = (strategy == DeliveryStrategy::Polling).then(|| {
        let bridge = Arc::clone(&bridge);
        let running = Arc::clone(&running);
        thread::spawn(move || poll_loop(&bridge, &running))
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    running.store(false, Ordering::SeqCst);
    host.detach(&bridge);
    tokio::task::spawn_blocking(move || server.stop()).await?;
    for handle in [reset_thread, poll_thread].into_iter().flatten() {
        let _ = handle.join();
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Which way the demo host is wired to the bridge.
#[derive(Clone, Copy)]
struct Host {
    strategy: DeliveryStrategy,
}

impl Host {
    fn attach(bridge: &Bridge, strategy: DeliveryStrategy) -> Self {
        let host = Self { strategy };
        host.become_ready(bridge);
        host
    }

    fn become_ready(&self, bridge: &Bridge) {
        match self.strategy {
            DeliveryStrategy::Callback => {
                bridge.register_handler(Some(Arc::new(|request: IncomingRequest| {
                    let reply = dispatch(request.body());
                    request.respond(reply);
                })));
            }
            DeliveryStrategy::Polling => {
                bridge.set_ready(true);
            }
        }
    }

    fn detach(&self, bridge: &Bridge) {
        match self.strategy {
            DeliveryStrategy::Callback => bridge.register_handler(None),
            DeliveryStrategy::Polling => bridge.set_ready(false),
        };
    }
}

fn poll_loop(bridge: &Bridge, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) {
        if let Some(request) = bridge.wait_for_request(Duration::from_millis(100)) {
            let reply = dispatch(request.body());
            let outcome = request.respond(reply);
            tracing::debug!(?outcome, "Host replied");
        }
    }
}

fn simulate_resets(
    bridge: &Bridge,
    strategy: DeliveryStrategy,
    every_secs: u64,
    outage: Duration,
    running: &AtomicBool,
) {
    let host = Host { strategy };
    let tick = Duration::from_millis(100);
    let mut elapsed = Duration::ZERO;
    while running.load(Ordering::SeqCst) {
        thread::sleep(tick);
        elapsed += tick;
        if elapsed < Duration::from_secs(every_secs) {
            continue;
        }
        elapsed = Duration::ZERO;

        tracing::info!(outage_ms = outage.as_millis() as u64, "Simulating host reset");
        host.detach(bridge);
        thread::sleep(outage);
        if running.load(Ordering::SeqCst) {
            host.become_ready(bridge);
        }
    }
}

/// Echo dispatcher standing in for a real host.
fn dispatch(body: &str) -> String {
    let request: Value = match serde_json::from_str(body) {
        Ok(value) => value,
        Err(_) => {
            return json!({
                "jsonrpc": "2.0",
                "error": { "code": -32700, "message": "Parse error" },
                "id": null,
            })
            .to_string()
        }
    };

    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let result = match request.get("method").and_then(Value::as_str) {
        Some("ping") => json!("pong"),
        Some("echo") => request.get("params").cloned().unwrap_or(Value::Null),
        Some("host/info") => json!({
            "process_id": reload_proxy::lifecycle::process_id(),
            "version": reload_proxy::lifecycle::version(),
        }),
        Some(method) => {
            return json!({
                "jsonrpc": "2.0",
                "error": { "code": -32601, "message": format!("Method not found: {method}") },
                "id": id,
            })
            .to_string()
        }
        None => {
            return json!({
                "jsonrpc": "2.0",
                "error": { "code": -32600, "message": "Invalid Request" },
                "id": id,
            })
            .to_string()
        }
    };

    json!({ "jsonrpc": "2.0", "result": result, "id": id }).to_string()
}
