use super::output::{output_chunks, output_lines};
use super::protocol::ProgressInterpreter;
use crate::config::UpdateConfig;
use crate::error::{LifecycleError, Result, UmbreldError, UpdateError};
use crate::lifecycle::{ManagedServices, PowerControl};
use crate::release::ReleaseSource;
use crate::status::{StatusRegisters, SystemState, UpdateStatusPatch, GENERIC_UPDATE_ERROR};
use futures::StreamExt;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Progress reported as soon as an attempt starts
const INITIAL_PROGRESS: u8 = 5;

/// Last progress value clients see before the host reboots
pub const FINAL_PROGRESS: u8 = 95;

/// Runs one update attempt end to end: fetch the release, execute its script
/// while streaming progress into the status registers, then stop services
/// and reboot.
pub struct UpdateRunner {
    registers: Arc<StatusRegisters>,
    releases: Arc<dyn ReleaseSource>,
    services: Arc<dyn ManagedServices>,
    power: Arc<dyn PowerControl>,
    shell: String,
    script_timeout: Option<Duration>,
}

impl UpdateRunner {
    pub fn new(
        registers: Arc<StatusRegisters>,
        releases: Arc<dyn ReleaseSource>,
        services: Arc<dyn ManagedServices>,
        power: Arc<dyn PowerControl>,
        shell: impl Into<String>,
        script_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registers,
            releases,
            services,
            power,
            shell: shell.into(),
            script_timeout,
        }
    }

    pub fn from_config(
        config: &UpdateConfig,
        registers: Arc<StatusRegisters>,
        releases: Arc<dyn ReleaseSource>,
        services: Arc<dyn ManagedServices>,
        power: Arc<dyn PowerControl>,
    ) -> Self {
        Self::new(
            registers,
            releases,
            services,
            power,
            config.shell.clone(),
            config.script_timeout(),
        )
    }

    /// Perform a full update attempt.
    ///
    /// Returns `Ok(true)` once the reboot has been issued and `Ok(false)` when
    /// the attempt failed; the reason is then in the update status. Only a
    /// request made while another lifecycle operation is in flight is an
    /// `Err`, and it leaves both registers untouched.
    pub async fn update(&self) -> Result<bool> {
        if let Err(state) = self.registers.try_begin_update() {
            warn!("Rejecting update request while system is {}", state);
            return Err(UmbreldError::SystemBusy {
                state: state.to_string(),
            });
        }

        let span = info_span!("update", attempt = %Uuid::new_v4());
        Ok(self.attempt().instrument(span).await)
    }

    async fn attempt(&self) -> bool {
        info!("Starting system update");
        self.registers.merge_update_status(UpdateStatusPatch {
            running: Some(true),
            progress: Some(INITIAL_PROGRESS),
            description: Some("Updating...".to_string()),
            error: Some(None),
        });

        if let Err(e) = self.install().await {
            error!("Update failed: {}", e);
            match e {
                UpdateError::Timeout { .. } => self.fail(&e.to_string()),
                _ => self.fail(GENERIC_UPDATE_ERROR),
            }
            return false;
        }

        self.registers
            .merge_update_status(UpdateStatusPatch::progress(FINAL_PROGRESS));
        info!("Update installed, stopping services and rebooting");

        if let Err(e) = self.reboot().await {
            error!("Update installed but reboot failed: {}", e);
            self.fail(&format!("Failed to reboot after update: {}", e));
            return false;
        }

        true
    }

    async fn install(&self) -> std::result::Result<(), UpdateError> {
        let release = self.releases.latest_release().await?;

        let Some(script_url) = release.update_script else {
            self.registers
                .merge_update_status(UpdateStatusPatch::error(UpdateError::MissingScript.to_string()));
            return Err(UpdateError::MissingScript);
        };

        let script = self.releases.fetch_script(&script_url).await?;
        info!("Running update script for version {}", release.version);

        match self.script_timeout {
            Some(limit) => timeout(limit, self.execute(script))
                .await
                .map_err(|_| UpdateError::Timeout { limit })?,
            None => self.execute(script).await,
        }
    }

    /// Pipe the script into the shell and interpret its output as it arrives
    async fn execute(&self, script: String) -> std::result::Result<(), UpdateError> {
        let mut child = Command::new(&self.shell)
            .arg("-s")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| UpdateError::Spawn {
                shell: self.shell.clone(),
                source,
            })?;

        let mut stdin = child.stdin.take().ok_or(UpdateError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(UpdateError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(UpdateError::MissingPipe("stderr"))?;

        // Fed from its own task so a large script cannot block output reading
        let feeder = tokio::spawn(async move {
            stdin.write_all(script.as_bytes()).await?;
            stdin.shutdown().await
        });

        let mut interpreter = ProgressInterpreter::new();
        let lines = output_lines(output_chunks(stdout, stderr));
        futures::pin_mut!(lines);

        while let Some(line) = lines.next().await {
            let line = line.map_err(UpdateError::Output)?;
            debug!(stream = ?line.stream, "update script: {}", line.text);

            if let Some(patch) = interpreter.interpret(&line.text).into_patch() {
                self.registers.merge_update_status(patch);
            }
        }

        match feeder.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Update shell stopped reading the script early: {}", e),
            Err(e) => warn!("Script feeder task failed: {}", e),
        }

        let status = child.wait().await.map_err(UpdateError::Wait)?;
        info!(dots = interpreter.dots(), "Update script exited with {}", status);

        if !status.success() {
            return Err(UpdateError::ScriptFailed {
                code: status.code(),
            });
        }

        Ok(())
    }

    async fn reboot(&self) -> std::result::Result<(), LifecycleError> {
        self.services.stop().await?;
        self.power.reboot().await
    }

    /// Back to idle with the error kept visible, and the system running again.
    /// An error the script reported itself wins over `fallback`.
    fn fail(&self, fallback: &str) {
        let message = self
            .registers
            .update_status()
            .error
            .unwrap_or_else(|| fallback.to_string());

        self.registers.reset_update_status_with_error(message);
        self.registers.set_system_state(SystemState::Running);
    }
}
