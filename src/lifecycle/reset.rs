use super::{ManagedServices, PowerControl};
use crate::error::{LifecycleError, Result, UmbreldError};
use crate::status::{StatusRegisters, SystemState};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Progress of the most recent factory reset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResetStatus {
    pub running: bool,
    pub progress: u8,
    pub description: String,
    #[serde(with = "crate::status::error_flag")]
    pub error: Option<String>,
}

/// Wipes the data directory and reboots, in the background
pub struct FactoryReset {
    registers: Arc<StatusRegisters>,
    services: Arc<dyn ManagedServices>,
    power: Arc<dyn PowerControl>,
    data_directory: PathBuf,
    tasks: TaskTracker,
    status: RwLock<ResetStatus>,
}

impl FactoryReset {
    pub fn new(
        registers: Arc<StatusRegisters>,
        services: Arc<dyn ManagedServices>,
        power: Arc<dyn PowerControl>,
        data_directory: impl Into<PathBuf>,
        tasks: TaskTracker,
    ) -> Self {
        Self {
            registers,
            services,
            power,
            data_directory: data_directory.into(),
            tasks,
            status: RwLock::new(ResetStatus::default()),
        }
    }

    pub fn status(&self) -> ResetStatus {
        self.status.read().clone()
    }

    /// Launch the reset and return its status as of launch. The reset keeps
    /// running after this returns, with the system state held at `restarting`
    /// until it fails or the host reboots.
    pub fn start(self: &Arc<Self>) -> Result<ResetStatus> {
        let snapshot = {
            let mut status = self.status.write();
            if status.running {
                return Err(UmbreldError::ResetInProgress);
            }
            // Leaves `running` for the whole reset so no update can begin
            self.registers
                .try_transition(SystemState::Restarting, &[SystemState::Running])
                .map_err(|state| UmbreldError::SystemBusy {
                    state: state.to_string(),
                })?;
            *status = ResetStatus {
                running: true,
                progress: 0,
                description: "Starting factory reset".to_string(),
                error: None,
            };
            status.clone()
        };

        info!(
            "Factory reset requested for {}",
            self.data_directory.display()
        );
        let reset = Arc::clone(self);
        self.tasks.spawn(async move { reset.run().await });

        Ok(snapshot)
    }

    async fn run(&self) {
        match self.perform().await {
            Ok(()) => {
                info!("Factory reset complete");
                self.advance(100, "Reset complete");
                self.status.write().running = false;
            }
            Err(e) => {
                error!("Factory reset failed: {}", e);
                {
                    let mut status = self.status.write();
                    status.running = false;
                    status.description = "Factory reset failed".to_string();
                    status.error = Some(e.to_string());
                }
                self.registers.set_system_state(SystemState::Running);
            }
        }
    }

    async fn perform(&self) -> std::result::Result<(), LifecycleError> {
        self.advance(10, "Stopping services");
        self.services.stop().await?;

        self.advance(40, "Removing data");
        clear_directory(&self.data_directory).await?;

        self.advance(90, "Restarting");
        self.power.reboot().await
    }

    fn advance(&self, progress: u8, description: &str) {
        info!("Factory reset: {} ({}%)", description, progress);
        let mut status = self.status.write();
        status.progress = progress;
        status.description = description.to_string();
    }
}

/// Remove everything inside `path`, keeping the directory itself
async fn clear_directory(path: &Path) -> std::result::Result<(), LifecycleError> {
    let removal_error = |path: &Path, source| LifecycleError::DataRemoval {
        path: path.display().to_string(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("Data directory {} does not exist, nothing to remove", path.display());
            return Ok(());
        }
        Err(e) => return Err(removal_error(path, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| removal_error(path, e))?
    {
        let entry_path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| removal_error(&entry_path, e))?;

        let removed = if file_type.is_dir() {
            tokio::fs::remove_dir_all(&entry_path).await
        } else {
            tokio::fs::remove_file(&entry_path).await
        };
        removed.map_err(|e| removal_error(&entry_path, e))?;
    }

    Ok(())
}
