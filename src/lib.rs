pub mod auth;
pub mod config;
pub mod error;
pub mod inspect;
pub mod lifecycle;
pub mod logs;
pub mod release;
pub mod status;
pub mod update;

#[cfg(feature = "server")]
pub mod api;

#[cfg(feature = "server")]
pub mod app;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{Authenticator, StaticAuthenticator};
pub use config::UmbreldConfig;
pub use error::{Result, UmbreldError};
pub use inspect::{SysinfoInspector, SystemInspector};
pub use lifecycle::{FactoryReset, LifecycleController, ResetStatus};
pub use logs::{LogReader, LogSource};
pub use release::{HttpReleaseFetcher, ReleaseInfo, ReleaseSource, VERSION};
pub use status::{StatusRegisters, StatusView, SystemState, UpdateStatus, UpdateStatusPatch};
pub use update::UpdateRunner;

#[cfg(feature = "server")]
pub use api::{ApiServer, ApiServerBuilder};

#[cfg(feature = "server")]
pub use app::{ComponentState, ShutdownReason, UmbreldOrchestrator};
