use crate::{
    auth::Authenticator,
    config::ServerConfig,
    error::{Result, UmbreldError},
    inspect::{ProcessClock, SystemInspector},
    lifecycle::LifecycleController,
    logs::LogReader,
    release::ReleaseSource,
    status::StatusView,
    update::UpdateRunner,
};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::guard::require_token;
use super::handlers::{
    cpu_temperature_handler, cpu_usage_handler, device_handler, disk_usage_handler,
    factory_reset_handler, factory_reset_status_handler, hidden_service_handler,
    latest_version_handler, logs_handler, memory_usage_handler, online_handler,
    restart_handler, shutdown_handler, status_handler, update_handler, update_status_handler,
    uptime_handler, version_handler,
};

/// Shared state for the Axum server
#[derive(Clone)]
pub struct ApiState {
    pub(crate) status: StatusView,
    pub(crate) runner: Arc<UpdateRunner>,
    pub(crate) releases: Arc<dyn ReleaseSource>,
    pub(crate) lifecycle: Arc<LifecycleController>,
    pub(crate) inspector: Arc<dyn SystemInspector>,
    pub(crate) logs: Arc<LogReader>,
    pub(crate) auth: Arc<dyn Authenticator>,
    pub(crate) clock: ProcessClock,
    pub(crate) data_directory: PathBuf,
    pub(crate) tasks: TaskTracker,
}

/// HTTP surface of the `system` procedures
pub struct ApiServer {
    pub(crate) config: ServerConfig,
    pub(crate) state: ApiState,
}

impl ApiServer {
    pub fn new(config: ServerConfig, state: ApiState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        let public = Router::new()
            .route("/system/online", get(online_handler))
            .route("/system/version", get(version_handler))
            .route("/system/status", get(status_handler))
            .route(
                "/system/getFactoryResetStatus",
                get(factory_reset_status_handler),
            );

        let restricted = Router::new()
            .route("/system/updateStatus", get(update_status_handler))
            .route("/system/uptime", get(uptime_handler))
            .route("/system/latestAvailableVersion", get(latest_version_handler))
            .route("/system/update", post(update_handler))
            .route("/system/hiddenService", get(hidden_service_handler))
            .route("/system/device", get(device_handler))
            .route("/system/cpuTemperature", get(cpu_temperature_handler))
            .route("/system/diskUsage", get(disk_usage_handler))
            .route("/system/memoryUsage", get(memory_usage_handler))
            .route("/system/cpuUsage", get(cpu_usage_handler))
            .route("/system/shutdown", post(shutdown_handler))
            .route("/system/restart", post(restart_handler))
            .route("/system/logs", get(logs_handler))
            .route("/system/factoryReset", post(factory_reset_handler))
            .route_layer(middleware::from_fn_with_state(
                self.state.clone(),
                require_token,
            ));

        Router::new()
            .merge(public)
            .merge(restricted)
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown` is cancelled
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let addr = format!("{}:{}", self.config.ip, self.config.port);
        info!("Starting API server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            UmbreldError::component("api", format!("failed to bind {}: {}", addr, e))
        })?;

        info!("API server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| UmbreldError::component("api", format!("server error: {}", e)))?;

        info!("API server stopped");
        Ok(())
    }
}

/// Assembles an [`ApiServer`] from its collaborators
#[derive(Default)]
pub struct ApiServerBuilder {
    config: Option<ServerConfig>,
    status: Option<StatusView>,
    runner: Option<Arc<UpdateRunner>>,
    releases: Option<Arc<dyn ReleaseSource>>,
    lifecycle: Option<Arc<LifecycleController>>,
    inspector: Option<Arc<dyn SystemInspector>>,
    logs: Option<Arc<LogReader>>,
    auth: Option<Arc<dyn Authenticator>>,
    clock: Option<ProcessClock>,
    data_directory: Option<PathBuf>,
    tasks: Option<TaskTracker>,
}

impl ApiServerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn status(mut self, status: StatusView) -> Self {
        self.status = Some(status);
        self
    }

    pub fn runner(mut self, runner: Arc<UpdateRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn releases(mut self, releases: Arc<dyn ReleaseSource>) -> Self {
        self.releases = Some(releases);
        self
    }

    pub fn lifecycle(mut self, lifecycle: Arc<LifecycleController>) -> Self {
        self.lifecycle = Some(lifecycle);
        self
    }

    pub fn inspector(mut self, inspector: Arc<dyn SystemInspector>) -> Self {
        self.inspector = Some(inspector);
        self
    }

    pub fn logs(mut self, logs: LogReader) -> Self {
        self.logs = Some(Arc::new(logs));
        self
    }

    pub fn auth(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Clock used for `uptime`; defaults to one started at build time
    pub fn clock(mut self, clock: ProcessClock) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn data_directory(mut self, data_directory: impl Into<PathBuf>) -> Self {
        self.data_directory = Some(data_directory.into());
        self
    }

    /// Tracker that owns spawned mutations so they outlive their request
    pub fn tasks(mut self, tasks: TaskTracker) -> Self {
        self.tasks = Some(tasks);
        self
    }

    pub fn build(self) -> Result<ApiServer> {
        let state = ApiState {
            status: required(self.status, "Status view")?,
            runner: required(self.runner, "Update runner")?,
            releases: required(self.releases, "Release source")?,
            lifecycle: required(self.lifecycle, "Lifecycle controller")?,
            inspector: required(self.inspector, "System inspector")?,
            logs: required(self.logs, "Log reader")?,
            auth: required(self.auth, "Authenticator")?,
            clock: self.clock.unwrap_or_default(),
            data_directory: required(self.data_directory, "Data directory")?,
            tasks: self.tasks.unwrap_or_default(),
        };

        Ok(ApiServer::new(
            required(self.config, "Server configuration")?,
            state,
        ))
    }
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.ok_or_else(|| UmbreldError::component("api", format!("{} is required", what)))
}
