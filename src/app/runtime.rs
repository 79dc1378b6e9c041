use super::{ShutdownReason, TimelapserApp};
use crate::error::{Result, TimelapserError};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl TimelapserApp {
    /// Run until a signal or [`request_shutdown`](Self::request_shutdown), then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("Timelapser is running");

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| TimelapserError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(Arc::clone(&self.shutdown_sender));

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| TimelapserError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Timelapser shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(
        &self,
        shutdown_sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
    ) {
        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};

            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            let cancel = self.cancellation_token.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal(SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };

                tokio::select! {
                    _ = cancel.cancelled() => {}
                    Some(()) = sigterm.recv() => {
                        info!("Received SIGTERM signal");
                        if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                            let _ = sender.send(ShutdownReason::Signal("SIGTERM"));
                        }
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        let cancel = self.cancellation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                Ok(()) = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT signal (Ctrl+C)");
                    if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGINT"));
                    }
                }
            }
        });
    }
}
