//! OS signal handling.

use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Wait for SIGINT (Ctrl+C) or SIGTERM
pub async fn shutdown_signal() -> OrchestratorResult<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .map_err(|e| OrchestratorError::Signal(format!("Ctrl+C handler: {e}")))
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(|e| OrchestratorError::Signal(format!("SIGTERM handler: {e}")))?
            .recv()
            .await;
        Ok::<(), OrchestratorError>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<OrchestratorResult<()>>();

    tokio::select! {
        result = ctrl_c => {
            result?;
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        result = terminate => {
            result?;
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
    Ok(())
}

/// Cancel `token` when a shutdown signal arrives.
///
/// The task ends early, without cancelling, if `token` is cancelled first.
pub fn cancel_on_signal(token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            result = shutdown_signal() => match result {
                Ok(()) => token.cancel(),
                Err(e) => error!(error = %e, "Failed to install signal handlers"),
            },
        }
    })
}
