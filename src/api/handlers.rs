use crate::error::UmbreldError;
use crate::inspect::{hidden_service, DeviceInfo, ResourceUsage};
use crate::lifecycle::ResetStatus;
use crate::logs::LogSource;
use crate::release::{AvailableVersion, VERSION};
use crate::status::{SystemState, UpdateStatus};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::future::Future;
use tracing::{error, info, warn};

use super::server::ApiState;

/// Error body returned by every procedure: `{"error": "..."}`
#[derive(Debug)]
pub struct ApiError(UmbreldError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            UmbreldError::Unauthorized => StatusCode::UNAUTHORIZED,
            UmbreldError::SystemBusy { .. } | UmbreldError::ResetInProgress => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UmbreldError> for ApiError {
    fn from(error: UmbreldError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Procedure failed: {}", self.0);
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a mutation on the daemon's task tracker so a dropped request does not
/// cancel it halfway.
async fn detached<F, T>(state: &ApiState, name: &str, operation: F) -> Result<T, ApiError>
where
    F: Future<Output = crate::error::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    state
        .tasks
        .spawn(operation)
        .await
        .map_err(|e| UmbreldError::system(format!("{} task failed: {}", name, e)))?
        .map_err(ApiError::from)
}

pub async fn online_handler() -> Json<bool> {
    Json(true)
}

pub async fn version_handler() -> Json<&'static str> {
    Json(VERSION)
}

pub async fn status_handler(State(state): State<ApiState>) -> Json<SystemState> {
    Json(state.status.system_state())
}

pub async fn update_status_handler(State(state): State<ApiState>) -> Json<UpdateStatus> {
    Json(state.status.update_status())
}

pub async fn uptime_handler(State(state): State<ApiState>) -> Json<u64> {
    Json(state.clock.uptime_seconds())
}

pub async fn latest_version_handler(State(state): State<ApiState>) -> ApiResult<AvailableVersion> {
    let release = state
        .releases
        .latest_release()
        .await
        .map_err(UmbreldError::from)?;
    Ok(Json(release.into()))
}

/// Runs the whole update; clients poll `updateStatus` for progress
pub async fn update_handler(State(state): State<ApiState>) -> ApiResult<bool> {
    info!("Update requested");
    let runner = state.runner.clone();
    let updated = detached(&state, "update", async move { runner.update().await }).await?;
    Ok(Json(updated))
}

pub async fn hidden_service_handler(State(state): State<ApiState>) -> Json<String> {
    Json(hidden_service(&state.data_directory).await)
}

pub async fn device_handler(State(state): State<ApiState>) -> Json<DeviceInfo> {
    Json(state.inspector.device().await)
}

pub async fn cpu_temperature_handler(State(state): State<ApiState>) -> Json<Option<f32>> {
    Json(state.inspector.cpu_temperature().await)
}

pub async fn disk_usage_handler(State(state): State<ApiState>) -> ApiResult<ResourceUsage> {
    Ok(Json(state.inspector.disk_usage().await?))
}

pub async fn memory_usage_handler(State(state): State<ApiState>) -> Json<ResourceUsage> {
    Json(state.inspector.memory_usage().await)
}

pub async fn cpu_usage_handler(State(state): State<ApiState>) -> Json<f32> {
    Json(state.inspector.cpu_usage().await)
}

pub async fn shutdown_handler(State(state): State<ApiState>) -> ApiResult<bool> {
    warn!("Shutdown requested");
    let lifecycle = state.lifecycle.clone();
    let done = detached(&state, "shutdown", async move { lifecycle.shutdown().await }).await?;
    Ok(Json(done))
}

pub async fn restart_handler(State(state): State<ApiState>) -> ApiResult<bool> {
    warn!("Restart requested");
    let lifecycle = state.lifecycle.clone();
    let done = detached(&state, "restart", async move { lifecycle.restart().await }).await?;
    Ok(Json(done))
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(rename = "type")]
    pub source: LogSource,
}

pub async fn logs_handler(
    State(state): State<ApiState>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<String> {
    Ok(Json(state.logs.read(query.source).await?))
}

#[derive(Debug, Deserialize)]
pub struct FactoryResetRequest {
    pub password: String,
}

pub async fn factory_reset_handler(
    State(state): State<ApiState>,
    Json(request): Json<FactoryResetRequest>,
) -> ApiResult<ResetStatus> {
    warn!("Factory reset requested");
    Ok(Json(state.lifecycle.factory_reset(&request.password).await?))
}

pub async fn factory_reset_status_handler(State(state): State<ApiState>) -> Json<ResetStatus> {
    Json(state.lifecycle.factory_reset_status())
}
