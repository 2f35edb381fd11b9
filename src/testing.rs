//! Test doubles for the collaborator traits

use crate::error::{LifecycleError, ReleaseError};
use crate::lifecycle::{ManagedServices, PowerControl};
use crate::release::{ReleaseInfo, ReleaseSource};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub(crate) const SCRIPT_URL: &str = "https://updates.example.invalid/update.sh";

/// Serves a fixed release and script; `release: None` behaves like an outage
pub(crate) struct StaticReleases {
    pub release: Option<ReleaseInfo>,
    pub script: String,
}

impl StaticReleases {
    pub fn with_script(script: &str) -> Self {
        Self {
            release: Some(ReleaseInfo {
                version: "1.1.0".to_string(),
                release_notes: "Test release".to_string(),
                update_script: Some(SCRIPT_URL.to_string()),
            }),
            script: script.to_string(),
        }
    }

    pub fn without_script() -> Self {
        let mut releases = Self::with_script("");
        if let Some(release) = releases.release.as_mut() {
            release.update_script = None;
        }
        releases
    }

    pub fn unavailable() -> Self {
        Self {
            release: None,
            script: String::new(),
        }
    }
}

#[async_trait]
impl ReleaseSource for StaticReleases {
    async fn latest_release(&self) -> Result<ReleaseInfo, ReleaseError> {
        self.release.clone().ok_or_else(|| ReleaseError::Status {
            url: "https://api.example.invalid/latest-release".to_string(),
            status: 503,
        })
    }

    async fn fetch_script(&self, url: &str) -> Result<String, ReleaseError> {
        assert_eq!(url, SCRIPT_URL);
        Ok(self.script.clone())
    }
}

#[derive(Default)]
pub(crate) struct RecordingServices {
    stops: AtomicUsize,
    pub fail: bool,
    pub delay: Option<Duration>,
}

impl RecordingServices {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Takes `delay` to stop, like a host with many running apps
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ManagedServices for RecordingServices {
    async fn stop(&self) -> Result<(), LifecycleError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(LifecycleError::CommandFailed {
                command: "stop-services".to_string(),
                code: Some(1),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingPower {
    reboots: AtomicUsize,
    power_offs: AtomicUsize,
    pub fail: bool,
}

impl RecordingPower {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reboots(&self) -> usize {
        self.reboots.load(Ordering::SeqCst)
    }

    pub fn power_offs(&self) -> usize {
        self.power_offs.load(Ordering::SeqCst)
    }

    fn result(&self, command: &str) -> Result<(), LifecycleError> {
        if self.fail {
            return Err(LifecycleError::CommandFailed {
                command: command.to_string(),
                code: Some(1),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PowerControl for RecordingPower {
    async fn reboot(&self) -> Result<(), LifecycleError> {
        self.reboots.fetch_add(1, Ordering::SeqCst);
        self.result("reboot")
    }

    async fn power_off(&self) -> Result<(), LifecycleError> {
        self.power_offs.fetch_add(1, Ordering::SeqCst);
        self.result("poweroff")
    }
}
