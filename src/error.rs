use thiserror::Error;

#[derive(Error, Debug)]
pub enum UmbreldError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Release error: {0}")]
    Release(#[from] ReleaseError),

    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("System is busy ({state})")]
    SystemBusy { state: String },

    #[error("A factory reset is already in progress")]
    ResetInProgress,

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl UmbreldError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Failures while talking to the release metadata endpoint
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} responded with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Failures that end a single update attempt
#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("No update script found")]
    MissingScript,

    #[error("Failed to fetch release: {0}")]
    Release(#[from] ReleaseError),

    #[error("Failed to start update shell '{shell}': {source}")]
    Spawn {
        shell: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Update shell has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Failed to read update script output: {0}")]
    Output(#[source] std::io::Error),

    #[error("Failed to wait for update script: {0}")]
    Wait(#[source] std::io::Error),

    #[error("Update script exited with {}", exit_description(.code))]
    ScriptFailed { code: Option<i32> },

    #[error("Update script timed out after {limit:?}")]
    Timeout { limit: std::time::Duration },
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// Failures while stopping services or issuing power commands
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Command is empty")]
    EmptyCommand,

    #[error("Failed to run '{command}': {source}")]
    CommandSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{command}' exited with status {code:?}")]
    CommandFailed { command: String, code: Option<i32> },

    #[error("Failed to clear {path}: {source}")]
    DataRemoval {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, UmbreldError>;
