use super::{ComponentState, UmbreldOrchestrator};
use crate::error::Result;
use std::sync::Arc;
use tracing::{error, info};

pub(super) const API: &str = "api";
pub(super) const TASKS: &str = "tasks";

impl UmbreldOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing umbreld components");

        let mut states = self.component_states.lock().await;
        states.insert(API.to_string(), ComponentState::Stopped);
        states.insert(TASKS.to_string(), ComponentState::Stopped);
        drop(states);

        info!(
            "System state is {}",
            self.registers.system_state()
        );
        Ok(())
    }

    /// Start serving the API in the background
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting umbreld");

        self.set_component_state(TASKS, ComponentState::Running)
            .await;

        self.set_component_state(API, ComponentState::Starting)
            .await;

        let server = Arc::clone(&self.api_server);
        let token = self.cancellation_token.clone();
        self.api_task = Some(tokio::spawn(async move {
            let result = server.start(token.clone()).await;
            if let Err(e) = &result {
                error!("API server error: {}", e);
                // Without the API the daemon has nothing left to do
                token.cancel();
            }
            result
        }));

        self.set_component_state(API, ComponentState::Running)
            .await;
        info!(
            "API server started on {}:{}",
            self.config.server.ip, self.config.server.port
        );

        Ok(())
    }
}
