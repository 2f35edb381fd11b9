use super::types::{ComponentState, ShutdownReason};
use crate::api::{ApiServer, ApiServerBuilder};
use crate::auth::{Authenticator, StaticAuthenticator};
use crate::config::UmbreldConfig;
use crate::error::Result;
use crate::inspect::{ProcessClock, SysinfoInspector};
use crate::lifecycle::{
    CommandPowerControl, DaemonServices, FactoryReset, LifecycleController, ManagedServices,
    PowerControl,
};
use crate::logs::LogReader;
use crate::release::{HttpReleaseFetcher, ReleaseSource};
use crate::status::StatusRegisters;
use crate::update::UpdateRunner;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

/// Upper bound on waiting for a running update or reset during shutdown
pub(super) const TASK_DRAIN_TIMEOUT: Duration = Duration::from_secs(600);

/// Owns the daemon's collaborators and drives startup, the main wait and
/// graceful shutdown.
pub struct UmbreldOrchestrator {
    pub(super) config: UmbreldConfig,
    pub(super) registers: Arc<StatusRegisters>,
    pub(super) api_server: Arc<ApiServer>,
    pub(super) api_task: Option<JoinHandle<Result<()>>>,

    // Update, restart and reset work that must outlive its request
    pub(super) tasks: TaskTracker,
    pub(super) drain_timeout: Duration,

    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl UmbreldOrchestrator {
    /// Wire every collaborator from configuration
    pub async fn new(config: UmbreldConfig) -> Result<Self> {
        let cancellation_token = CancellationToken::new();
        let tasks = TaskTracker::new();
        let registers = Arc::new(StatusRegisters::new());
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let releases: Arc<dyn ReleaseSource> = Arc::new(HttpReleaseFetcher::new(
            config.update.release_endpoint.clone(),
            config.update.fetch_timeout(),
        )?);
        let services: Arc<dyn ManagedServices> = Arc::new(DaemonServices::new(
            cancellation_token.clone(),
            config.system.service_stop_command.clone(),
        ));
        let power: Arc<dyn PowerControl> =
            Arc::new(CommandPowerControl::from_config(&config.system));
        let auth: Arc<dyn Authenticator> =
            Arc::new(StaticAuthenticator::from_config(&config.auth));

        let reset = Arc::new(FactoryReset::new(
            Arc::clone(&registers),
            Arc::clone(&services),
            Arc::clone(&power),
            config.system.data_directory.clone(),
            tasks.clone(),
        ));
        let lifecycle = Arc::new(LifecycleController::new(
            Arc::clone(&registers),
            Arc::clone(&services),
            Arc::clone(&power),
            Arc::clone(&auth),
            reset,
        ));
        let runner = Arc::new(UpdateRunner::from_config(
            &config.update,
            Arc::clone(&registers),
            Arc::clone(&releases),
            services,
            power,
        ));

        let api_server = ApiServerBuilder::new()
            .config(config.server.clone())
            .status(registers.view())
            .runner(runner)
            .releases(releases)
            .lifecycle(lifecycle)
            .inspector(Arc::new(SysinfoInspector::new(
                config.system.data_directory.clone(),
            )))
            .logs(LogReader::from_config(&config.logs))
            .auth(auth)
            .clock(ProcessClock::start())
            .data_directory(config.system.data_directory.clone())
            .tasks(tasks.clone())
            .build()?;

        info!(
            "Release endpoint {}, data directory {}",
            config.update.release_endpoint,
            config.system.data_directory.display()
        );

        Ok(Self {
            config,
            registers,
            api_server: Arc::new(api_server),
            api_task: None,
            tasks,
            drain_timeout: TASK_DRAIN_TIMEOUT,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token,
        })
    }

    /// Token cancelled when managed services stop; cancelling it ends [`run`](Self::run)
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// Tracker for work that shutdown must wait for
    pub fn tasks(&self) -> TaskTracker {
        self.tasks.clone()
    }

    pub fn status_registers(&self) -> Arc<StatusRegisters> {
        Arc::clone(&self.registers)
    }
}
