//! Synchronous listener binding.
//!
//! # Responsibilities
//! - Resolve the configured bind address
//! - Bind before any background work starts so failures reach the caller
//! - Classify bind failures (port in use, permission, bad address)

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// The bind address did not resolve to any socket address.
    InvalidAddress(String),
    /// Another socket already owns the port.
    AddressInUse(SocketAddr),
    /// The process may not bind this address (privileged port, policy).
    PermissionDenied(SocketAddr),
    /// Any other socket failure.
    Io(io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::InvalidAddress(addr) => write!(f, "Invalid bind address: {}", addr),
            ListenerError::AddressInUse(addr) => write!(f, "Address already in use: {}", addr),
            ListenerError::PermissionDenied(addr) => write!(f, "Permission denied binding {}", addr),
            ListenerError::Io(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Bind a non-blocking listener on `bind_address:port`.
///
/// Every resolved address is tried in order; the last failure is reported.
pub fn bind(bind_address: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let host = bind_address.trim();
    if host.is_empty() {
        return Err(ListenerError::InvalidAddress(bind_address.to_string()));
    }

    let candidates: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| ListenerError::InvalidAddress(format!("{}:{}", host, port)))?
        .collect();

    let mut last_error = ListenerError::InvalidAddress(format!("{}:{}", host, port));
    for addr in candidates {
        match TcpListener::bind(addr) {
            Ok(listener) => {
                listener.set_nonblocking(true).map_err(ListenerError::Io)?;
                let local_addr = listener.local_addr().map_err(ListenerError::Io)?;
                tracing::info!(address = %local_addr, "Listener bound");
                return Ok(listener);
            }
            Err(e) => {
                tracing::debug!(address = %addr, error = %e, "Bind attempt failed");
                last_error = classify(addr, e);
            }
        }
    }
    Err(last_error)
}

fn classify(addr: SocketAddr, error: io::Error) -> ListenerError {
    match error.kind() {
        ErrorKind::AddrInUse => ListenerError::AddressInUse(addr),
        ErrorKind::PermissionDenied => ListenerError::PermissionDenied(addr),
        ErrorKind::AddrNotAvailable => ListenerError::InvalidAddress(addr.to_string()),
        _ => ListenerError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_ephemeral_port() {
        let listener = bind("127.0.0.1", 0).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn reports_port_in_use() {
        let first = bind("127.0.0.1", 0).unwrap();
        let port = first.local_addr().unwrap().port();
        match bind("127.0.0.1", port) {
            Err(ListenerError::AddressInUse(addr)) => assert_eq!(addr.port(), port),
            other => panic!("expected AddressInUse, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unresolvable_address() {
        assert!(matches!(bind("", 8080), Err(ListenerError::InvalidAddress(_))));
        assert!(matches!(
            bind("not an address", 8080),
            Err(ListenerError::InvalidAddress(_))
        ));
    }

    #[test]
    fn port_is_free_again_after_drop() {
        let first = bind("127.0.0.1", 0).unwrap();
        let port = first.local_addr().unwrap().port();
        drop(first);
        assert!(bind("127.0.0.1", port).is_ok());
    }
}
