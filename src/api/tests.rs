use super::server::ApiServerBuilder;
use super::ApiServer;
use crate::auth::StaticAuthenticator;
use crate::config::ServerConfig;
use crate::error::Result;
use crate::inspect::{DeviceInfo, ResourceUsage, SystemInspector};
use crate::lifecycle::{FactoryReset, LifecycleController};
use crate::logs::LogReader;
use crate::release::VERSION;
use crate::status::{StatusRegisters, SystemState};
use crate::testing::{RecordingPower, RecordingServices, StaticReleases};
use crate::update::UpdateRunner;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio_util::task::TaskTracker;
use tower::ServiceExt;

const TOKEN: &str = "api-token";
const PASSWORD: &str = "hunter2";

struct FixedInspector;

#[async_trait]
impl SystemInspector for FixedInspector {
    async fn device(&self) -> DeviceInfo {
        DeviceInfo {
            model: "Umbrel Home".to_string(),
            serial: "UH-0001".to_string(),
        }
    }

    async fn cpu_temperature(&self) -> Option<f32> {
        None
    }

    async fn disk_usage(&self) -> Result<ResourceUsage> {
        Ok(ResourceUsage {
            size: 1000,
            used: 250,
            available: 750,
        })
    }

    async fn memory_usage(&self) -> ResourceUsage {
        ResourceUsage::default()
    }

    async fn cpu_usage(&self) -> f32 {
        12.5
    }
}

struct Harness {
    registers: Arc<StatusRegisters>,
    power: Arc<RecordingPower>,
    server: ApiServer,
    _data: tempfile::TempDir,
}

fn harness(script: &str) -> Harness {
    let data = tempfile::tempdir().unwrap();
    let registers = Arc::new(StatusRegisters::new());
    let releases = Arc::new(StaticReleases::with_script(script));
    let services = Arc::new(RecordingServices::default());
    let power = Arc::new(RecordingPower::default());
    let auth = Arc::new(StaticAuthenticator::new(
        Some(TOKEN.to_string()),
        Some(PASSWORD.to_string()),
    ));
    let tasks = TaskTracker::new();

    let reset = Arc::new(FactoryReset::new(
        Arc::clone(&registers),
        services.clone(),
        power.clone(),
        data.path(),
        tasks.clone(),
    ));
    let lifecycle = Arc::new(LifecycleController::new(
        Arc::clone(&registers),
        services.clone(),
        power.clone(),
        auth.clone(),
        reset,
    ));
    let runner = Arc::new(UpdateRunner::new(
        Arc::clone(&registers),
        releases.clone(),
        services,
        power.clone(),
        "sh",
        None,
    ));

    let server = ApiServerBuilder::new()
        .config(ServerConfig::default())
        .status(registers.view())
        .runner(runner)
        .releases(releases)
        .lifecycle(lifecycle)
        .inspector(Arc::new(FixedInspector))
        .logs(LogReader::new("umbrel", 10))
        .auth(auth)
        .data_directory(data.path())
        .tasks(tasks)
        .build()
        .unwrap();

    Harness {
        registers,
        power,
        server,
        _data: data,
    }
}

async fn call(
    h: &Harness,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = h.server.router().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn get(h: &Harness, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
    call(h, Method::GET, uri, token, None).await
}

async fn post(h: &Harness, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    call(h, Method::POST, uri, token, body).await
}

#[tokio::test]
async fn test_public_procedures_need_no_token() {
    let h = harness("exit 0\n");

    assert_eq!(get(&h, "/system/online", None).await, (StatusCode::OK, json!(true)));
    assert_eq!(get(&h, "/system/version", None).await, (StatusCode::OK, json!(VERSION)));
    assert_eq!(get(&h, "/system/status", None).await, (StatusCode::OK, json!("running")));

    h.registers.set_system_state(SystemState::ShuttingDown);
    assert_eq!(
        get(&h, "/system/status", None).await,
        (StatusCode::OK, json!("shutting-down"))
    );
}

#[tokio::test]
async fn test_factory_reset_status_is_public() {
    let h = harness("exit 0\n");

    let (status, body) = get(&h, "/system/getFactoryResetStatus", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"running": false, "progress": 0, "description": "", "error": false})
    );
}

#[tokio::test]
async fn test_restricted_procedures_require_token() {
    let h = harness("exit 0\n");

    for uri in [
        "/system/updateStatus",
        "/system/uptime",
        "/system/hiddenService",
        "/system/device",
        "/system/logs?type=umbrel",
    ] {
        let (status, body) = get(&h, uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body, json!({"error": "Unauthorized"}));

        let (status, _) = get(&h, uri, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let (status, _) = post(&h, "/system/restart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(h.power.reboots(), 0);
}

#[tokio::test]
async fn test_idle_update_status_wire_format() {
    let h = harness("exit 0\n");

    let (status, body) = get(&h, "/system/updateStatus", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"running": false, "progress": 0, "description": "", "error": false})
    );
}

#[tokio::test]
async fn test_hidden_service_missing_is_empty_string() {
    let h = harness("exit 0\n");

    assert_eq!(
        get(&h, "/system/hiddenService", Some(TOKEN)).await,
        (StatusCode::OK, json!(""))
    );
}

#[tokio::test]
async fn test_inspection_procedures() {
    let h = harness("exit 0\n");

    assert_eq!(
        get(&h, "/system/device", Some(TOKEN)).await,
        (StatusCode::OK, json!({"model": "Umbrel Home", "serial": "UH-0001"}))
    );
    assert_eq!(
        get(&h, "/system/diskUsage", Some(TOKEN)).await,
        (StatusCode::OK, json!({"size": 1000, "used": 250, "available": 750}))
    );
    assert_eq!(
        get(&h, "/system/cpuTemperature", Some(TOKEN)).await,
        (StatusCode::OK, Value::Null)
    );
    assert_eq!(
        get(&h, "/system/cpuUsage", Some(TOKEN)).await,
        (StatusCode::OK, json!(12.5))
    );
}

#[tokio::test]
async fn test_latest_available_version_hides_script() {
    let h = harness("exit 0\n");

    assert_eq!(
        get(&h, "/system/latestAvailableVersion", Some(TOKEN)).await,
        (
            StatusCode::OK,
            json!({"version": "1.1.0", "releaseNotes": "Test release"})
        )
    );
}

#[tokio::test]
async fn test_update_runs_to_reboot() {
    let h = harness("echo 'umbrel-update: {\"description\": \"Installing\"}'\n");

    assert_eq!(
        post(&h, "/system/update", Some(TOKEN), None).await,
        (StatusCode::OK, json!(true))
    );
    assert_eq!(h.power.reboots(), 1);

    let (_, body) = get(&h, "/system/updateStatus", Some(TOKEN)).await;
    assert_eq!(body["progress"], json!(95));
    assert_eq!(body["description"], json!("Installing"));
}

#[tokio::test]
async fn test_update_while_busy_conflicts() {
    let h = harness("exit 0\n");
    h.registers.set_system_state(SystemState::Updating);

    let (status, body) = post(&h, "/system/update", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("updating"));
    assert_eq!(h.power.reboots(), 0);
}

#[tokio::test]
async fn test_logs_rejects_unknown_source() {
    let h = harness("exit 0\n");

    let (status, _) = get(&h, "/system/logs?type=kernel", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_factory_reset_with_wrong_password() {
    let h = harness("exit 0\n");

    let (status, body) = post(
        &h,
        "/system/factoryReset",
        Some(TOKEN),
        Some(json!({"password": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Unauthorized"}));

    let (_, reset) = get(&h, "/system/getFactoryResetStatus", None).await;
    assert_eq!(reset["running"], json!(false));
}

#[tokio::test]
async fn test_factory_reset_launches() {
    let h = harness("exit 0\n");

    let (status, body) = post(
        &h,
        "/system/factoryReset",
        Some(TOKEN),
        Some(json!({"password": PASSWORD})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["running"], json!(true));
    assert_eq!(body["error"], json!(false));
}

#[test]
fn test_builder_requires_components() {
    let result = ApiServerBuilder::new()
        .config(ServerConfig::default())
        .build();
    assert!(result.is_err());
}
