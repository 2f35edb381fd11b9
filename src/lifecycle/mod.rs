mod command;
mod controller;
mod power;
mod reset;
mod services;

pub use controller::LifecycleController;
pub use power::{CommandPowerControl, PowerControl};
pub use reset::{FactoryReset, ResetStatus};
pub use services::{DaemonServices, ManagedServices};
