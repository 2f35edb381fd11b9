//! Process-wide status registers.
//!
//! Two cells are shared between the update runner, the lifecycle controller
//! and any number of readers: the coarse [`SystemState`] and the fine-grained
//! [`UpdateStatus`]. Every write happens under a single lock acquisition, so a
//! reader always sees a complete snapshot, never a half-merged record.

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Message recorded when an update fails without a more specific reason
pub const GENERIC_UPDATE_ERROR: &str = "Update failed";

/// Coarse lifecycle signal for the whole managed system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemState {
    #[default]
    Running,
    Updating,
    ShuttingDown,
    Restarting,
    Migrating,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Running => "running",
            SystemState::Updating => "updating",
            SystemState::ShuttingDown => "shutting-down",
            SystemState::Restarting => "restarting",
            SystemState::Migrating => "migrating",
        }
    }
}

impl fmt::Display for SystemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress and error record for the running or most recently failed update
///
/// `error` is `None` when no error is recorded and is serialized as `false`
/// in that case, matching what polling clients expect.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub running: bool,
    pub progress: u8,
    pub description: String,
    #[serde(with = "error_flag")]
    pub error: Option<String>,
}

impl UpdateStatus {
    /// Shallow-merge a patch; fields absent from the patch keep their value
    pub fn apply(&mut self, patch: UpdateStatusPatch) {
        if let Some(running) = patch.running {
            self.running = running;
        }
        if let Some(progress) = patch.progress {
            self.progress = progress.min(100);
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
    }

    /// Idle means never started, or completed and reset without error
    pub fn is_idle(&self) -> bool {
        !self.running && self.error.is_none()
    }
}

/// Partial [`UpdateStatus`], as sent by update scripts on `umbrel-update:` lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateStatusPatch {
    #[serde(default)]
    pub running: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_progress")]
    pub progress: Option<u8>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "error_flag::deserialize_patch")]
    pub error: Option<Option<String>>,
}

impl UpdateStatusPatch {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn error<S: Into<String>>(message: S) -> Self {
        Self {
            error: Some(Some(message.into())),
            ..Self::default()
        }
    }
}

// Scripts may report fractional or out-of-range numbers
fn deserialize_progress<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<f64> = Option::deserialize(deserializer)?;
    Ok(value.map(|progress| progress.clamp(0.0, 100.0).floor() as u8))
}

/// Wire format for error fields: `false` for none, a string for a message
pub(crate) mod error_flag {
    use super::GENERIC_UPDATE_ERROR;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Wire {
        Flag(bool),
        Message(String),
    }

    fn into_message(wire: Option<Wire>) -> Option<String> {
        match wire {
            None | Some(Wire::Flag(false)) => None,
            Some(Wire::Flag(true)) => Some(GENERIC_UPDATE_ERROR.to_string()),
            Some(Wire::Message(message)) => Some(message),
        }
    }

    pub fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(message) => serializer.serialize_str(message),
            None => serializer.serialize_bool(false),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(into_message(Option::deserialize(deserializer)?))
    }

    /// Present-but-false clears the error; an absent field is handled by `#[serde(default)]`
    pub fn deserialize_patch<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Some(into_message(Option::deserialize(deserializer)?)))
    }
}

/// Owner of the two process-wide status cells
#[derive(Debug, Default)]
pub struct StatusRegisters {
    system_state: RwLock<SystemState>,
    update_status: RwLock<UpdateStatus>,
}

impl StatusRegisters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only handle for observers
    pub fn view(self: &Arc<Self>) -> StatusView {
        StatusView(Arc::clone(self))
    }

    pub fn system_state(&self) -> SystemState {
        *self.system_state.read()
    }

    /// Full replace of the system state
    pub fn set_system_state(&self, state: SystemState) {
        let previous = std::mem::replace(&mut *self.system_state.write(), state);
        if previous != state {
            info!("System state changed: {} -> {}", previous, state);
        }
    }

    /// Move from `running` to `updating`, failing if anything else is in flight
    pub fn try_begin_update(&self) -> Result<(), SystemState> {
        self.try_transition(SystemState::Updating, &[SystemState::Running])
            .map(|_| ())
    }

    /// Check and set under one write lock. Returns the previous state, or the
    /// current one unchanged when it is not in `allowed_from`.
    pub fn try_transition(
        &self,
        to: SystemState,
        allowed_from: &[SystemState],
    ) -> Result<SystemState, SystemState> {
        let mut state = self.system_state.write();
        let previous = *state;
        if !allowed_from.contains(&previous) {
            return Err(previous);
        }
        *state = to;
        if previous != to {
            info!("System state changed: {} -> {}", previous, to);
        }
        Ok(previous)
    }

    pub fn update_status(&self) -> UpdateStatus {
        self.update_status.read().clone()
    }

    /// Merge a patch and return the resulting snapshot
    pub fn merge_update_status(&self, patch: UpdateStatusPatch) -> UpdateStatus {
        let mut status = self.update_status.write();
        status.apply(patch);
        debug!(
            running = status.running,
            progress = status.progress,
            "Update status: {}",
            status.description
        );
        status.clone()
    }

    pub fn reset_update_status(&self) {
        *self.update_status.write() = UpdateStatus::default();
    }

    /// Reset to idle while keeping an error visible, in one write
    pub fn reset_update_status_with_error<S: Into<String>>(&self, message: S) {
        *self.update_status.write() = UpdateStatus {
            error: Some(message.into()),
            ..UpdateStatus::default()
        };
    }
}

/// Cloneable read-only view over [`StatusRegisters`]
#[derive(Debug, Clone)]
pub struct StatusView(Arc<StatusRegisters>);

impl StatusView {
    pub fn system_state(&self) -> SystemState {
        self.0.system_state()
    }

    pub fn update_status(&self) -> UpdateStatus {
        self.0.update_status()
    }
}
