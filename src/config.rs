use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct UmbreldConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// IP address to bind to
    #[serde(default = "default_server_ip")]
    pub ip: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UpdateConfig {
    /// Endpoint returning the latest release metadata
    #[serde(default = "default_release_endpoint")]
    pub release_endpoint: String,

    /// Shell the update script is piped into
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Timeout for release and script downloads. Unset means wait forever.
    #[serde(default)]
    pub fetch_timeout_seconds: Option<u64>,

    /// Timeout for the update script itself. Unset means wait forever.
    #[serde(default)]
    pub script_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Root of the managed data (apps, tor, user db)
    #[serde(default = "default_data_directory")]
    pub data_directory: PathBuf,

    /// Command issued to reboot the host
    #[serde(default = "default_reboot_command")]
    pub reboot_command: Vec<String>,

    /// Command issued to power off the host
    #[serde(default = "default_shutdown_command")]
    pub shutdown_command: Vec<String>,

    /// Command run when the daemon stops its managed services
    #[serde(default)]
    pub service_stop_command: Option<Vec<String>>,

    /// Log power commands instead of running them
    #[serde(default)]
    pub dry_run_power: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LogsConfig {
    /// systemd unit read for the "umbrel" log source
    #[serde(default = "default_umbrel_unit")]
    pub umbrel_unit: String,

    /// Number of trailing lines returned
    #[serde(default = "default_log_lines")]
    pub lines: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuthConfig {
    /// Bearer token accepted on restricted procedures
    #[serde(default)]
    pub token: Option<String>,

    /// Credential required for a factory reset
    #[serde(default)]
    pub password: Option<String>,
}

impl UmbreldConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("umbreld.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("server.ip", default_server_ip())?
            .set_default("server.port", default_server_port())?
            .set_default("update.release_endpoint", default_release_endpoint())?
            .set_default("update.shell", default_shell())?
            .set_default(
                "system.data_directory",
                default_data_directory().to_string_lossy().into_owned(),
            )?
            .set_default("system.reboot_command", default_reboot_command())?
            .set_default("system.shutdown_command", default_shutdown_command())?
            .set_default("system.dry_run_power", false)?
            .set_default("logs.umbrel_unit", default_umbrel_unit())?
            .set_default("logs.lines", default_log_lines() as i64)?
            .add_source(File::with_name(&path_str).required(false))
            // UMBRELD_SERVER__PORT style keys, since field names contain underscores
            .add_source(
                Environment::with_prefix("UMBRELD")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: UmbreldConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config.redacted());

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message(
                "Server port must be greater than 0".to_string(),
            ));
        }

        if self.update.release_endpoint.trim().is_empty() {
            return Err(ConfigError::Message(
                "Release endpoint must not be empty".to_string(),
            ));
        }

        if self.update.shell.trim().is_empty() {
            return Err(ConfigError::Message(
                "Update shell must not be empty".to_string(),
            ));
        }

        if self.system.reboot_command.is_empty() || self.system.shutdown_command.is_empty() {
            return Err(ConfigError::Message(
                "Reboot and shutdown commands must not be empty".to_string(),
            ));
        }

        if matches!(&self.system.service_stop_command, Some(command) if command.is_empty()) {
            return Err(ConfigError::Message(
                "Service stop command must not be empty when set".to_string(),
            ));
        }

        if self.logs.lines == 0 {
            return Err(ConfigError::Message(
                "Log line count must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Copy with credentials masked, for logging
    pub fn redacted(&self) -> Self {
        let mask = |value: &Option<String>| value.as_ref().map(|_| "********".to_string());
        let mut copy = self.clone();
        copy.auth.token = mask(&self.auth.token);
        copy.auth.password = mask(&self.auth.password);
        copy
    }
}

impl UpdateConfig {
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_seconds.map(Duration::from_secs)
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        self.script_timeout_seconds.map(Duration::from_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_server_ip(),
            port: default_server_port(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            release_endpoint: default_release_endpoint(),
            shell: default_shell(),
            fetch_timeout_seconds: None,
            script_timeout_seconds: None,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_directory: default_data_directory(),
            reboot_command: default_reboot_command(),
            shutdown_command: default_shutdown_command(),
            service_stop_command: None,
            dry_run_power: false,
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            umbrel_unit: default_umbrel_unit(),
            lines: default_log_lines(),
        }
    }
}

// Default value functions
fn default_server_ip() -> String {
    "0.0.0.0".to_string()
}
fn default_server_port() -> u16 {
    80
}

fn default_release_endpoint() -> String {
    "https://api.umbrel.com/latest-release".to_string()
}
fn default_shell() -> String {
    "bash".to_string()
}

fn default_data_directory() -> PathBuf {
    PathBuf::from("/home/umbrel/umbrel")
}
fn default_reboot_command() -> Vec<String> {
    vec!["reboot".to_string()]
}
fn default_shutdown_command() -> Vec<String> {
    vec!["poweroff".to_string()]
}

fn default_umbrel_unit() -> String {
    "umbrel".to_string()
}
fn default_log_lines() -> usize {
    1500
}
