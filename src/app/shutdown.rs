use super::startup::{API, TASKS};
use super::{ComponentState, UmbreldOrchestrator};
use crate::error::{Result, UmbreldError};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

const API_STOP_TIMEOUT: Duration = Duration::from_secs(10);

impl UmbreldOrchestrator {
    /// Stop the API, then wait for tracked update and reset work to finish
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        let mut exit_code = 0;

        if let Err(e) = self.stop_api().await {
            error!("Error stopping {}: {}", API, e);
            exit_code = 1;
        }

        if let Err(e) = self.drain_tasks().await {
            error!("Error stopping {}: {}", TASKS, e);
            exit_code = 1;
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    async fn stop_api(&mut self) -> Result<()> {
        let Some(task) = self.api_task.take() else {
            self.set_component_state(API, ComponentState::Stopped).await;
            return Ok(());
        };

        self.stop_component(API, API_STOP_TIMEOUT, async move {
            task.await
                .map_err(|e| UmbreldError::component(API, format!("task panicked: {}", e)))?
        })
        .await
    }

    async fn drain_tasks(&mut self) -> Result<()> {
        self.tasks.close();
        if !self.tasks.is_empty() {
            warn!(
                "Waiting for {} background operation(s) to finish",
                self.tasks.len()
            );
        }

        let tasks = self.tasks.clone();
        self.stop_component(TASKS, self.drain_timeout, async move {
            tasks.wait().await;
            Ok(())
        })
        .await
    }

    async fn stop_component<F>(&self, component: &str, limit: Duration, stop: F) -> Result<()>
    where
        F: Future<Output = Result<()>>,
    {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(())) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(UmbreldError::component(
                    component,
                    format!("stop timed out after {:?}", limit),
                ))
            }
        }
    }
}
