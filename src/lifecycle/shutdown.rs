//! Shutdown coordination for the poll thread.

use std::time::Duration;

use tokio::sync::broadcast;

/// How the HTTP server should wind down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop accepting, let in-flight connections finish within the grace.
    Graceful(Duration),
    /// Close everything now.
    Immediate,
}

/// Coordinator for shutdown.
///
/// Provides a broadcast channel that long-running tasks subscribe to.
/// Dropping the coordinator closes the channel, which subscribers treat as
/// an immediate shutdown.
pub struct Shutdown {
    tx: broadcast::Sender<ShutdownMode>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownMode> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Returns `false` if nobody is listening.
    pub fn trigger(&self, mode: ShutdownMode) -> bool {
        self.tx.send(mode).is_ok()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for the next signal; a closed channel means immediate shutdown.
pub async fn wait_for(rx: &mut broadcast::Receiver<ShutdownMode>) -> ShutdownMode {
    rx.recv().await.unwrap_or(ShutdownMode::Immediate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_the_mode() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();

        assert!(shutdown.trigger(ShutdownMode::Graceful(Duration::from_secs(1))));
        assert_eq!(
            wait_for(&mut rx).await,
            ShutdownMode::Graceful(Duration::from_secs(1))
        );
    }

    #[tokio::test]
    async fn dropped_coordinator_means_immediate() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        drop(shutdown);
        assert_eq!(wait_for(&mut rx).await, ShutdownMode::Immediate);
    }

    #[test]
    fn trigger_without_subscribers_reports_false() {
        assert!(!Shutdown::new().trigger(ShutdownMode::Immediate));
    }
}
