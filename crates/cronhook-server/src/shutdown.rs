//! Graceful shutdown handling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::info;

/// Shutdown signal receiver
pub type ShutdownReceiver = broadcast::Receiver<()>;

/// Graceful shutdown coordinator
#[derive(Clone)]
pub struct ShutdownController {
    sender: broadcast::Sender<()>,
    is_shutting_down: Arc<AtomicBool>,
    timeout: Duration,
}

impl ShutdownController {
    pub fn new(timeout: Duration) -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            is_shutting_down: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Create with default 30 second timeout
    pub fn with_default_timeout() -> Self {
        Self::new(Duration::from_secs(30))
    }

    /// Subscribe to the shutdown signal
    pub fn subscribe(&self) -> ShutdownReceiver {
        self.sender.subscribe()
    }

    /// Initiate shutdown (idempotent)
    pub fn shutdown(&self) {
        if self
            .is_shutting_down
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("Initiating graceful shutdown");
            let _ = self.sender.send(());
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.is_shutting_down.load(Ordering::SeqCst)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::with_default_timeout()
    }
}

/// Listen for OS shutdown signals (SIGINT, SIGTERM)
pub async fn listen_for_shutdown_signals(controller: ShutdownController) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }

    controller.shutdown();
}

/// Future that resolves when shutdown is initiated; handed to
/// `axum::serve::with_graceful_shutdown`
pub async fn graceful_shutdown(controller: ShutdownController) {
    let mut receiver = controller.subscribe();
    let _ = receiver.recv().await;
    info!("Starting graceful shutdown sequence");
}
