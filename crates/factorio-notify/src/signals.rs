//! Operator shutdown signals.
//!
//! SIGINT and SIGTERM raise the shared shutdown flag. The first signal
//! starts the shutdown; later ones are logged and otherwise ignored.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// Raise the shutdown flag. Returns `true` if this call raised it.
pub fn request_shutdown(shutdown_tx: &watch::Sender<bool>, reason: &str) -> bool {
    let already = shutdown_tx.send_replace(true);
    if already {
        info!(reason, "Shutdown already in progress, ignoring");
    } else {
        info!(reason, "Shutdown requested");
    }
    !already
}

/// Install signal handlers and forward them to `shutdown_tx`.
///
/// Must be called from within a tokio runtime.
#[cfg(unix)]
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let reason = tokio::select! {
                Some(()) = sigint.recv() => "SIGINT",
                Some(()) = sigterm.recv() => "SIGTERM",
                else => break,
            };
            request_shutdown(&shutdown_tx, reason);
        }
    }))
}

/// Install the Ctrl+C handler and forward it to `shutdown_tx`.
#[cfg(not(unix))]
pub fn spawn_signal_listener(shutdown_tx: watch::Sender<bool>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            request_shutdown(&shutdown_tx, "Ctrl+C");
        }
    }))
}
