use super::{FactoryReset, ManagedServices, PowerControl, ResetStatus};
use crate::auth::Authenticator;
use crate::error::{LifecycleError, Result, UmbreldError};
use crate::status::{StatusRegisters, SystemState};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PowerAction {
    Reboot,
    PowerOff,
}

/// Coordinates shutdown, restart and factory reset
pub struct LifecycleController {
    registers: Arc<StatusRegisters>,
    services: Arc<dyn ManagedServices>,
    power: Arc<dyn PowerControl>,
    auth: Arc<dyn Authenticator>,
    reset: Arc<FactoryReset>,
}

impl LifecycleController {
    pub fn new(
        registers: Arc<StatusRegisters>,
        services: Arc<dyn ManagedServices>,
        power: Arc<dyn PowerControl>,
        auth: Arc<dyn Authenticator>,
        reset: Arc<FactoryReset>,
    ) -> Self {
        Self {
            registers,
            services,
            power,
            auth,
            reset,
        }
    }

    /// Stop services and power the host off
    pub async fn shutdown(&self) -> Result<bool> {
        self.transition(SystemState::ShuttingDown, PowerAction::PowerOff)
            .await
    }

    /// Stop services and reboot the host
    pub async fn restart(&self) -> Result<bool> {
        self.transition(SystemState::Restarting, PowerAction::Reboot)
            .await
    }

    /// Check the password, then start a reset and return its launch snapshot
    pub async fn factory_reset(&self, password: &str) -> Result<ResetStatus> {
        if !self.auth.validate_password(password).await {
            warn!("Factory reset rejected: invalid password");
            return Err(UmbreldError::Unauthorized);
        }

        self.reset.start()
    }

    /// Current reset progress. Needs no credentials since they may already be wiped.
    pub fn factory_reset_status(&self) -> ResetStatus {
        self.reset.status()
    }

    async fn transition(&self, state: SystemState, action: PowerAction) -> Result<bool> {
        if let Err(current) = self
            .registers
            .try_transition(state, &[SystemState::Running])
        {
            warn!("Rejecting {} while system is {}", state, current);
            return Err(UmbreldError::SystemBusy {
                state: current.to_string(),
            });
        }
        info!("System is {}", state);

        if let Err(e) = self.stop_and_power(action).await {
            error!("Failed while {}: {}", state, e);
            self.registers.set_system_state(SystemState::Running);
            return Err(e.into());
        }

        Ok(true)
    }

    async fn stop_and_power(&self, action: PowerAction) -> std::result::Result<(), LifecycleError> {
        self.services.stop().await?;
        match action {
            PowerAction::Reboot => self.power.reboot().await,
            PowerAction::PowerOff => self.power.power_off().await,
        }
    }
}
