use std::fmt;

/// Lifecycle of a daemon component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the daemon is exiting
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    /// Managed services were stopped ahead of a reboot or power-off
    ServicesStopped,
    Error(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "received {}", signal),
            Self::ServicesStopped => write!(f, "services stopped"),
            Self::Error(message) => write!(f, "error: {}", message),
        }
    }
}
