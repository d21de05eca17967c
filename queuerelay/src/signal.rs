//! Shutdown signal handling

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait for SIGINT or SIGTERM, then cancel `token`
#[cfg(unix)]
pub async fn cancel_on_signal(token: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => Some(sigterm),
        Err(e) => {
            warn!(error = %e, "Failed to set up SIGTERM handler");
            None
        }
    };

    let terminate = async {
        match sigterm.as_mut() {
            Some(sigterm) => {
                sigterm.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!(signal = "SIGINT", "Signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for SIGINT, shutting down"),
        },
        _ = terminate => info!(signal = "SIGTERM", "Signal received"),
        _ = token.cancelled() => return,
    }

    token.cancel();
}

/// Wait for Ctrl-C, then cancel `token`
#[cfg(not(unix))]
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!(signal = "ctrl-c", "Signal received"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c, shutting down"),
        },
        _ = token.cancelled() => return,
    }

    token.cancel();
}
