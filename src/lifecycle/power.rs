use super::command::run_command;
use crate::config::SystemConfig;
use crate::error::LifecycleError;
use async_trait::async_trait;
use tracing::{info, warn};

/// OS-level power transitions
#[async_trait]
pub trait PowerControl: Send + Sync {
    async fn reboot(&self) -> Result<(), LifecycleError>;

    async fn power_off(&self) -> Result<(), LifecycleError>;
}

/// [`PowerControl`] that shells out to the configured commands
pub struct CommandPowerControl {
    reboot_command: Vec<String>,
    shutdown_command: Vec<String>,
    dry_run: bool,
}

impl CommandPowerControl {
    pub fn new(reboot_command: Vec<String>, shutdown_command: Vec<String>, dry_run: bool) -> Self {
        Self {
            reboot_command,
            shutdown_command,
            dry_run,
        }
    }

    pub fn from_config(config: &SystemConfig) -> Self {
        Self::new(
            config.reboot_command.clone(),
            config.shutdown_command.clone(),
            config.dry_run_power,
        )
    }

    async fn issue(&self, action: &str, argv: &[String]) -> Result<(), LifecycleError> {
        if self.dry_run {
            warn!("Dry run: not issuing {} command '{}'", action, argv.join(" "));
            return Ok(());
        }

        info!("Issuing {} command", action);
        run_command(argv).await
    }
}

#[async_trait]
impl PowerControl for CommandPowerControl {
    async fn reboot(&self) -> Result<(), LifecycleError> {
        self.issue("reboot", &self.reboot_command).await
    }

    async fn power_off(&self) -> Result<(), LifecycleError> {
        self.issue("shutdown", &self.shutdown_command).await
    }
}
