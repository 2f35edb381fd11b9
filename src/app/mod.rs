mod orchestrator;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;


pub use orchestrator::UmbreldOrchestrator;
pub use types::{ComponentState, ShutdownReason};
