use super::{ShutdownReason, UmbreldOrchestrator};
use crate::error::{Result, UmbreldError};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

impl UmbreldOrchestrator {
    /// Wait for a signal or for managed services to stop, then shut down
    pub async fn run(&mut self) -> Result<i32> {
        info!("umbreld is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| UmbreldError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| UmbreldError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let reason = tokio::select! {
            received = shutdown_receiver => received.map_err(|_| {
                UmbreldError::system("Shutdown channel closed unexpectedly")
            })?,
            _ = self.cancellation_token.cancelled() => ShutdownReason::ServicesStopped,
        };

        info!("Shutdown initiated: {}", reason);

        let exit_code = self.shutdown().await?;

        info!("umbreld shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // SIGTERM is how systemd stops the unit
        #[cfg(unix)]
        {
            let sender = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            error!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = sender.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let sender = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = sender.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
