use super::command::run_command;
use crate::error::LifecycleError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// The daemon's own managed services, stopped before any power transition
#[async_trait]
pub trait ManagedServices: Send + Sync {
    async fn stop(&self) -> Result<(), LifecycleError>;
}

/// Stops the running daemon: runs the optional stop command, then cancels
/// the daemon-wide token so background tasks and the API wind down.
pub struct DaemonServices {
    token: CancellationToken,
    stop_command: Option<Vec<String>>,
}

impl DaemonServices {
    pub fn new(token: CancellationToken, stop_command: Option<Vec<String>>) -> Self {
        Self {
            token,
            stop_command,
        }
    }
}

#[async_trait]
impl ManagedServices for DaemonServices {
    async fn stop(&self) -> Result<(), LifecycleError> {
        info!("Stopping managed services");

        // The token is cancelled whether or not the stop command succeeded
        let result = match &self.stop_command {
            Some(command) => run_command(command).await,
            None => Ok(()),
        };
        self.token.cancel();

        result
    }
}
