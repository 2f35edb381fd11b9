//! Host inspection: hardware identity, sensors, resource usage and the
//! onion address of the web interface.

use crate::error::{Result, UmbreldError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use sysinfo::{Components, Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::debug;

const MODEL_FILES: &[&str] = &[
    "/proc/device-tree/model",
    "/sys/devices/virtual/dmi/id/product_name",
];
const SERIAL_FILES: &[&str] = &[
    "/proc/device-tree/serial-number",
    "/sys/devices/virtual/dmi/id/product_serial",
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
}

/// Byte counts for a storage device or for memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub size: u64,
    pub used: u64,
    pub available: u64,
}

impl ResourceUsage {
    fn from_totals(size: u64, available: u64) -> Self {
        Self {
            size,
            used: size.saturating_sub(available),
            available,
        }
    }
}

/// Source of the host readings served by the API
#[async_trait]
pub trait SystemInspector: Send + Sync {
    async fn device(&self) -> DeviceInfo;

    /// Hottest CPU sensor in °C, if the host exposes any
    async fn cpu_temperature(&self) -> Option<f32>;

    async fn disk_usage(&self) -> Result<ResourceUsage>;

    async fn memory_usage(&self) -> ResourceUsage;

    /// Global CPU utilisation in percent
    async fn cpu_usage(&self) -> f32;
}

/// [`SystemInspector`] backed by `sysinfo` and the kernel's device files
pub struct SysinfoInspector {
    data_directory: PathBuf,
    model_files: Vec<PathBuf>,
    serial_files: Vec<PathBuf>,
    system: Mutex<System>,
}

impl SysinfoInspector {
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            model_files: MODEL_FILES.iter().map(PathBuf::from).collect(),
            serial_files: SERIAL_FILES.iter().map(PathBuf::from).collect(),
            system: Mutex::new(System::new()),
        }
    }

    /// Override where the device model and serial are read from
    pub fn with_device_files(mut self, model_files: Vec<PathBuf>, serial_files: Vec<PathBuf>) -> Self {
        self.model_files = model_files;
        self.serial_files = serial_files;
        self
    }
}

#[async_trait]
impl SystemInspector for SysinfoInspector {
    async fn device(&self) -> DeviceInfo {
        DeviceInfo {
            model: read_first(&self.model_files).await.unwrap_or_default(),
            serial: read_first(&self.serial_files).await.unwrap_or_default(),
        }
    }

    async fn cpu_temperature(&self) -> Option<f32> {
        // Sensor discovery walks sysfs
        let temperatures = tokio::task::spawn_blocking(|| {
            Components::new_with_refreshed_list()
                .list()
                .iter()
                .map(|c| (c.label().to_string(), c.temperature()))
                .collect::<Vec<(String, f32)>>()
        })
        .await;

        match temperatures {
            Ok(temperatures) => hottest_cpu(&temperatures),
            Err(e) => {
                debug!("Temperature probe failed: {}", e);
                None
            }
        }
    }

    async fn disk_usage(&self) -> Result<ResourceUsage> {
        let target = tokio::fs::canonicalize(&self.data_directory)
            .await
            .unwrap_or_else(|_| self.data_directory.clone());

        let mounts = tokio::task::spawn_blocking(|| {
            Disks::new_with_refreshed_list()
                .list()
                .iter()
                .map(|d| (d.mount_point().to_path_buf(), d.total_space(), d.available_space()))
                .collect::<Vec<(PathBuf, u64, u64)>>()
        })
        .await
        .map_err(|e| UmbreldError::component("inspect", format!("disk probe failed: {}", e)))?;

        let (mount, size, available) = containing_mount(&target, &mounts).ok_or_else(|| {
            UmbreldError::component(
                "inspect",
                format!("no disk holds {}", self.data_directory.display()),
            )
        })?;
        debug!("{} is on {}", target.display(), mount.display());

        Ok(ResourceUsage::from_totals(size, available))
    }

    async fn memory_usage(&self) -> ResourceUsage {
        let mut system = self.system.lock();
        system.refresh_memory();
        ResourceUsage::from_totals(system.total_memory(), system.available_memory())
    }

    async fn cpu_usage(&self) -> f32 {
        self.system.lock().refresh_cpu();
        // sysinfo needs two samples at least this far apart
        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;
        let mut system = self.system.lock();
        system.refresh_cpu();
        system.global_cpu_info().cpu_usage()
    }
}

/// Seconds since the daemon started
#[derive(Debug, Clone, Copy)]
pub struct ProcessClock {
    started: Instant,
}

impl ProcessClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ProcessClock {
    fn default() -> Self {
        Self::start()
    }
}

pub fn hidden_service_path(data_directory: &Path) -> PathBuf {
    data_directory.join("tor/data/web/hostname")
}

/// The web interface's onion hostname, or an empty string if it cannot be read
pub async fn hidden_service(data_directory: &Path) -> String {
    let path = hidden_service_path(data_directory);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents.trim().to_string(),
        Err(e) => {
            debug!("No hidden service at {}: {}", path.display(), e);
            String::new()
        }
    }
}

/// Contents of the first readable, non-empty file, with device-tree NULs trimmed
async fn read_first(candidates: &[PathBuf]) -> Option<String> {
    for path in candidates {
        if let Ok(contents) = tokio::fs::read_to_string(path).await {
            let value = contents.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn hottest_cpu(readings: &[(String, f32)]) -> Option<f32> {
    readings
        .iter()
        .filter(|(label, temperature)| is_cpu_sensor(label) && temperature.is_finite())
        .map(|(_, temperature)| *temperature)
        .reduce(f32::max)
}

fn is_cpu_sensor(label: &str) -> bool {
    let label = label.to_ascii_lowercase();
    ["cpu", "core", "package", "k10temp", "coretemp", "soc"]
        .iter()
        .any(|needle| label.contains(needle))
}

/// Deepest mount point that contains `target`
fn containing_mount<'a>(
    target: &Path,
    mounts: &'a [(PathBuf, u64, u64)],
) -> Option<(&'a Path, u64, u64)> {
    mounts
        .iter()
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(mount, size, available)| (mount.as_path(), *size, *available))
}
