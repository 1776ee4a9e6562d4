//! Graceful shutdown for the repofetch CLI
//!
//! A signal cancels the shared [`CancellationToken`]; in-flight fetches see
//! it and stop with a transient interruption, leaving no completion marker.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cancels the fetch token when SIGINT or SIGTERM arrives
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token handed to the evaluator
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger a shutdown
    pub fn shutdown(&self) {
        info!("Shutdown triggered, cancelling in-flight fetches");
        self.token.cancel();
    }

    /// Whether a shutdown was triggered
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Install signal handlers for graceful shutdown
///
/// Returns a `ShutdownCoordinator` whose token is cancelled when SIGTERM or
/// SIGINT is received. Must be called from within a tokio runtime.
#[must_use]
pub fn install_signal_handlers() -> ShutdownCoordinator {
    let coordinator = ShutdownCoordinator::new();
    let coordinator_clone = coordinator.clone();

    tokio::spawn(async move {
        if wait_for_signal().await {
            coordinator_clone.shutdown();
        }
    });

    coordinator
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) =
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "Failed to install signal handlers");
                return false;
            }
        };

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
    true
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, initiating graceful shutdown");
            true
        }
        Err(e) => {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            false
        }
    }
}
