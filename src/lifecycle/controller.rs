//! Server lifecycle: start, stop, unload and status.
//!
//! # Responsibilities
//! - Bind synchronously and report bind failures to the caller
//! - Run the HTTP server on one background thread with its own runtime
//! - Release the port before `stop` returns
//! - Detach cleanly when the host unloads the library while running
//!
//! # Design Decisions
//! - Security settings are copied at start; setters apply on the next start
//! - `stop` holds the server slot while joining, so a concurrent `start`
//!   cannot race the old listener for the port
//! - `unload` never joins; it waits at most the unload grace for the poll
//!   thread to report the socket closed, then lets it go

use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use axum_server::Handle;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::bridge::{Availability, Bridge};
use crate::config::{load_tls_material, ConfigError, DeliveryStrategy, ProxyConfig};
use crate::http::{AppState, HttpServer};
use crate::lifecycle::shutdown::{self, Shutdown, ShutdownMode};
use crate::net::{self, tls_supported, ListenerError, TlsError};
use crate::security::{AuthState, SecuritySettings, TlsMaterial};

/// Failure to bring the listener up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("address already in use: {0}")]
    AddressInUse(SocketAddr),

    #[error("permission denied binding {0}")]
    PermissionDenied(SocketAddr),

    #[error("invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("TLS setup failed: {0}")]
    Tls(#[from] TlsError),

    #[error("server was unloaded and cannot be restarted")]
    Unloaded,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<ListenerError> for StartError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::AddressInUse(addr) => StartError::AddressInUse(addr),
            ListenerError::PermissionDenied(addr) => StartError::PermissionDenied(addr),
            ListenerError::InvalidAddress(addr) => StartError::InvalidBindAddress(addr),
            ListenerError::Io(e) => StartError::Io(e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(SocketAddr),
    /// A listener was already up; nothing was bound.
    AlreadyRunning(SocketAddr),
}

impl StartOutcome {
    pub fn local_addr(&self) -> SocketAddr {
        match self {
            StartOutcome::Started(addr) | StartOutcome::AlreadyRunning(addr) => *addr,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

/// Point-in-time view for hosts and the demo CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub running: bool,
    pub availability: Availability,
    pub ready: bool,
    pub pending_request: bool,
    pub strategy: DeliveryStrategy,
    pub local_addr: Option<SocketAddr>,
    pub tls: bool,
    pub auth: bool,
    pub tls_supported: bool,
    pub process_id: u32,
    pub version: &'static str,
}

struct RunningServer {
    local_addr: SocketAddr,
    tls: bool,
    auth: bool,
    shutdown: Shutdown,
    thread: JoinHandle<()>,
    exited: mpsc::Receiver<()>,
}

/// Owns the bridge and, while running, the listener and its poll thread.
pub struct ProxyServer {
    config: ProxyConfig,
    bridge: Arc<Bridge>,
    settings: Mutex<SecuritySettings>,
    running: Mutex<Option<RunningServer>>,
}

impl ProxyServer {
    /// Create a stopped server. TLS files named in the config are not read;
    /// use [`ProxyServer::from_config`] for that.
    pub fn new(config: ProxyConfig) -> Self {
        let settings = SecuritySettings::from_config(&config);
        Self {
            bridge: Bridge::new(config.bridge.clone()),
            settings: Mutex::new(settings),
            running: Mutex::new(None),
            config,
        }
    }

    /// Create a stopped server, loading TLS material from the configured files.
    pub fn from_config(config: ProxyConfig) -> Result<Self, ConfigError> {
        let tls = config
            .listener
            .tls
            .as_ref()
            .map(load_tls_material)
            .transpose()?;
        let server = Self::new(config);
        server.settings.lock().tls = tls;
        Ok(server)
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The bridge the host consumer talks to. Stays valid across restarts.
    pub fn bridge(&self) -> Arc<Bridge> {
        Arc::clone(&self.bridge)
    }

    pub fn configure_bind_address(&self, bind_address: impl Into<String>) {
        self.settings.lock().bind_address = bind_address.into();
    }

    /// An empty key disables bearer enforcement.
    pub fn configure_api_key(&self, api_key: impl Into<String>) {
        self.settings.lock().api_key = api_key.into();
    }

    /// Missing either half disables TLS.
    pub fn configure_tls(&self, cert_pem: &str, key_pem: &str) {
        self.settings.lock().set_tls(cert_pem, key_pem);
    }

    /// Start on the configured port.
    pub fn start(&self) -> Result<StartOutcome, StartError> {
        self.start_on(self.config.listener.port)
    }

    /// Start on `port` (0 picks an ephemeral port).
    pub fn start_on(&self, port: u16) -> Result<StartOutcome, StartError> {
        let mut running = self.running.lock();
        if let Some(server) = running.as_ref() {
            tracing::debug!(address = %server.local_addr, "Start requested while running");
            return Ok(StartOutcome::AlreadyRunning(server.local_addr));
        }
        if self.bridge.is_sealed() {
            return Err(StartError::Unloaded);
        }

        let settings = self.settings.lock().clone();
        if let Some(material) = &settings.tls {
            net::validate_pem(material)?;
        }

        let listener = net::bind(&settings.bind_address, port)?;
        let local_addr = listener.local_addr()?;
        if !self.bridge.open() {
            return Err(StartError::Unloaded);
        }

        let shutdown = Shutdown::new();
        let signals = shutdown.subscribe();
        let (ready_tx, ready_rx) = mpsc::channel();
        let (exited_tx, exited_rx) = mpsc::channel();
        let worker = PollThread {
            listener,
            state: AppState::new(&self.bridge),
            auth: AuthState::new(&settings.api_key),
            tls: settings.tls.clone(),
            signals,
            ready: ready_tx,
            exited: exited_tx,
        };

        let thread = thread::Builder::new()
            .name("reload-proxy-poll".into())
            .spawn(move || worker.run())?;

        let startup = ready_rx.recv().unwrap_or_else(|_| {
            Err(StartError::Io(io::Error::other("poll thread exited during startup")))
        });
        if let Err(err) = startup {
            if thread.join().is_err() {
                tracing::error!("Poll thread panicked during startup");
            }
            return Err(err);
        }

        tracing::info!(
            address = %local_addr,
            tls = settings.tls.is_some(),
            auth = settings.auth_enabled(),
            strategy = %self.config.bridge.strategy,
            "Proxy server started"
        );

        *running = Some(RunningServer {
            local_addr,
            tls: settings.tls.is_some(),
            auth: settings.auth_enabled(),
            shutdown,
            thread,
            exited: exited_rx,
        });
        Ok(StartOutcome::Started(local_addr))
    }

    /// Stop the listener and wait for the port to be released.
    ///
    /// Waiting requests are answered with a shutdown error first.
    pub fn stop(&self) -> StopOutcome {
        let mut running = self.running.lock();
        let Some(server) = running.take() else {
            return StopOutcome::NotRunning;
        };

        self.bridge.close();
        server
            .shutdown
            .trigger(ShutdownMode::Graceful(self.config.lifecycle.shutdown_grace()));
        if server.thread.join().is_err() {
            tracing::error!("Poll thread panicked");
        }

        tracing::info!(address = %server.local_addr, "Proxy server stopped");
        StopOutcome::Stopped
    }

    /// The library is being replaced while possibly running.
    ///
    /// Seals the bridge, asks the poll thread to close the listener at once
    /// and waits at most the unload grace for it. The thread is detached if
    /// it has not finished by then.
    pub fn unload(&self) {
        self.bridge.seal();
        let Some(server) = self.running.lock().take() else {
            return;
        };

        server.shutdown.trigger(ShutdownMode::Immediate);
        let grace = self.config.lifecycle.unload_grace();
        match server.exited.recv_timeout(grace) {
            Ok(()) => {
                if server.thread.join().is_err() {
                    tracing::error!("Poll thread panicked");
                }
                tracing::info!(address = %server.local_addr, "Listener released during unload");
            }
            Err(_) => tracing::warn!(
                address = %server.local_addr,
                grace_ms = grace.as_millis() as u64,
                "Poll thread still running after unload grace, detaching"
            ),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|server| server.local_addr)
    }

    pub fn status(&self) -> ServerStatus {
        let running = self.running.lock();
        ServerStatus {
            running: running.is_some(),
            availability: self.bridge.availability(),
            ready: self.bridge.is_ready(),
            pending_request: self.bridge.has_pending_request(),
            strategy: self.config.bridge.strategy,
            local_addr: running.as_ref().map(|s| s.local_addr),
            tls: running.as_ref().is_some_and(|s| s.tls),
            auth: running.as_ref().is_some_and(|s| s.auth),
            tls_supported: tls_supported(),
            process_id: process_id(),
            version: version(),
        }
    }

    pub fn process_id(&self) -> u32 {
        process_id()
    }

    pub fn version(&self) -> &'static str {
        version()
    }
}

impl Drop for ProxyServer {
    fn drop(&mut self) {
        if self.running.get_mut().is_some() {
            self.unload();
        }
    }
}

pub fn process_id() -> u32 {
    std::process::id()
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Everything the background thread owns.
struct PollThread {
    listener: TcpListener,
    state: AppState,
    auth: AuthState,
    tls: Option<TlsMaterial>,
    signals: broadcast::Receiver<ShutdownMode>,
    ready: mpsc::Sender<Result<(), StartError>>,
    exited: mpsc::Sender<()>,
}

impl PollThread {
    fn run(self) {
        let PollThread {
            listener,
            state,
            auth,
            tls,
            mut signals,
            ready,
            exited,
        } = self;

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                let _ = ready.send(Err(StartError::Io(e)));
                return;
            }
        };

        runtime.block_on(async move {
            let server_tls = match tls {
                Some(material) => match net::load_server_tls(&material).await {
                    Ok(config) => Some(config),
                    Err(e) => {
                        let _ = ready.send(Err(e.into()));
                        return;
                    }
                },
                None => None,
            };

            let handle = Handle::new();
            let forward = handle.clone();
            tokio::spawn(async move {
                match shutdown::wait_for(&mut signals).await {
                    ShutdownMode::Graceful(grace) => forward.graceful_shutdown(Some(grace)),
                    ShutdownMode::Immediate => forward.shutdown(),
                }
            });

            let _ = ready.send(Ok(()));
            if let Err(e) = HttpServer::new(state, auth)
                .run(listener, server_tls, handle)
                .await
            {
                tracing::error!(error = %e, "HTTP server failed");
            }
        });

        // Blocked bridge waits were woken by the close; anything left is dropped.
        runtime.shutdown_timeout(std::time::Duration::from_millis(100));
        let _ = exited.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> ProxyServer {
        ProxyServer::new(ProxyConfig::default())
    }

    fn eventually_free(addr: SocketAddr) -> bool {
        (0..50).any(|_| {
            if TcpListener::bind(addr).is_ok() {
                return true;
            }
            thread::sleep(std::time::Duration::from_millis(20));
            false
        })
    }

    #[test]
    fn start_is_idempotent() {
        let server = server();
        let addr = match server.start_on(0).unwrap() {
            StartOutcome::Started(addr) => addr,
            other => panic!("expected Started, got {other:?}"),
        };
        assert_eq!(server.start_on(0).unwrap(), StartOutcome::AlreadyRunning(addr));
        assert_eq!(server.stop(), StopOutcome::Stopped);
        assert_eq!(server.stop(), StopOutcome::NotRunning);
    }

    #[test]
    fn stop_releases_the_port() {
        let server = server();
        let addr = server.start_on(0).unwrap().local_addr();
        server.stop();
        assert!(TcpListener::bind(addr).is_ok());

        let again = server.start_on(addr.port()).unwrap();
        assert_eq!(again, StartOutcome::Started(addr));
        server.stop();
    }

    #[test]
    fn bind_conflict_is_reported() {
        let holder = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = holder.local_addr().unwrap().port();
        let server = server();
        assert!(matches!(
            server.start_on(port),
            Err(StartError::AddressInUse(_))
        ));
        assert!(!server.is_running());
    }

    #[test]
    fn unload_releases_port_and_blocks_restart() {
        let server = server();
        let addr = server.start_on(0).unwrap().local_addr();
        server.unload();

        assert!(!server.is_running());
        assert!(server.bridge().is_sealed());
        assert!(matches!(server.start_on(0), Err(StartError::Unloaded)));
        assert_eq!(server.bridge().set_ready(true), Availability::ShuttingDown);
        assert!(eventually_free(addr));
    }

    #[test]
    fn settings_apply_at_next_start() {
        let server = server();
        server.configure_api_key("secret");
        server.start_on(0).unwrap();
        assert!(server.status().auth);

        server.configure_api_key("");
        assert!(server.status().auth, "running listener keeps its snapshot");
        server.stop();

        server.start_on(0).unwrap();
        assert!(!server.status().auth);
        server.stop();
    }

    #[test]
    fn invalid_bind_address_is_reported() {
        let server = server();
        server.configure_bind_address("");
        assert!(matches!(
            server.start_on(0),
            Err(StartError::InvalidBindAddress(_))
        ));
    }

    #[cfg(feature = "tls")]
    #[test]
    fn malformed_tls_material_fails_start() {
        let server = server();
        server.configure_tls("not a certificate", "not a key");
        assert!(matches!(server.start_on(0), Err(StartError::Tls(_))));
        assert!(!server.is_running());
    }

    #[test]
    fn status_reports_identity() {
        let status = server().status();
        assert!(!status.running);
        assert_eq!(status.process_id, std::process::id());
        assert_eq!(status.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(status.availability, Availability::Unavailable);
        assert_eq!(status.tls_supported, cfg!(feature = "tls"));
    }
}
