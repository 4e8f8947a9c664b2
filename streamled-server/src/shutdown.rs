//! Signal handling for graceful shutdown.

use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Creates a future that completes when a shutdown signal is received.
///
/// Listens for SIGTERM and SIGINT (Ctrl+C). If the SIGTERM handler cannot be
/// installed, only Ctrl+C is awaited.
pub async fn shutdown_signal() {
    let sigterm = async {
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = sigterm => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for SIGINT");
            }
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
}

/// Broadcast a stop to the background tasks fed by `tx`.
pub fn signal_stop(tx: &watch::Sender<bool>) {
    // Only fails when every receiver is gone, i.e. nothing is left to stop.
    let _ = tx.send(true);
}

/// Wait for a background task, giving up after `grace`.
pub async fn join_with_grace(name: &'static str, handle: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(())) => tracing::debug!(task = name, "Task finished"),
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
        Err(_) => tracing::warn!(task = name, "Task did not finish in time"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stop_reaches_receivers() {
        let (tx, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            while !*rx.borrow_and_update() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        });

        signal_stop(&tx);
        join_with_grace("waiter", task, Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn slow_task_is_abandoned() {
        let task = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        let started = tokio::time::Instant::now();
        join_with_grace("sleeper", task, Duration::from_secs(2)).await;
        assert!(started.elapsed() < Duration::from_secs(60));
    }
}
