use super::*;
use crate::auth::StaticAuthenticator;
use crate::error::UmbreldError;
use crate::lifecycle::{FactoryReset, LifecycleController};
use crate::status::{StatusRegisters, SystemState, UpdateStatus, GENERIC_UPDATE_ERROR};
use crate::testing::{RecordingPower, RecordingServices, StaticReleases};
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    registers: Arc<StatusRegisters>,
    services: Arc<RecordingServices>,
    power: Arc<RecordingPower>,
    runner: Arc<UpdateRunner>,
}

fn harness_with(
    releases: StaticReleases,
    services: RecordingServices,
    power: RecordingPower,
    script_timeout: Option<Duration>,
) -> Harness {
    let registers = Arc::new(StatusRegisters::new());
    let services = Arc::new(services);
    let power = Arc::new(power);
    let runner = Arc::new(UpdateRunner::new(
        Arc::clone(&registers),
        Arc::new(releases),
        services.clone(),
        power.clone(),
        "sh",
        script_timeout,
    ));

    Harness {
        registers,
        services,
        power,
        runner,
    }
}

fn harness(script: &str) -> Harness {
    harness_with(
        StaticReleases::with_script(script),
        RecordingServices::default(),
        RecordingPower::default(),
        None,
    )
}

fn assert_failed_with(harness: &Harness, message: &str) {
    assert_eq!(
        harness.registers.update_status(),
        UpdateStatus {
            running: false,
            progress: 0,
            description: String::new(),
            error: Some(message.to_string()),
        }
    );
    assert_eq!(harness.registers.system_state(), SystemState::Running);
    assert_eq!(harness.power.reboots(), 0);
}

#[tokio::test]
async fn test_successful_update_reboots_at_final_progress() {
    let h = harness(
        r#"
echo 'umbrel-update: {"description": "Downloading"}'
i=0
while [ $i -lt 35 ]; do echo .; i=$((i+1)); done
exit 0
"#,
    );

    assert!(h.runner.update().await.unwrap());

    let status = h.registers.update_status();
    assert!(status.running);
    assert_eq!(status.progress, FINAL_PROGRESS);
    assert_eq!(status.description, "Downloading");
    assert_eq!(status.error, None);
    assert_eq!(h.registers.system_state(), SystemState::Updating);
    assert_eq!(h.services.stops(), 1);
    assert_eq!(h.power.reboots(), 1);
}

#[tokio::test]
async fn test_malformed_status_line_does_not_stop_processing() {
    let h = harness(
        r#"
echo 'umbrel-update: not-json'
echo 'umbrel-update: {"description": "After bad line"}'
"#,
    );

    assert!(h.runner.update().await.unwrap());
    assert_eq!(h.registers.update_status().description, "After bad line");
}

#[tokio::test]
async fn test_status_line_split_across_writes() {
    let h = harness(
        r#"
printf 'umbrel-update: {"descr'
sleep 0.2
printf 'iption": "Split"}\n'
"#,
    );

    assert!(h.runner.update().await.unwrap());
    assert_eq!(h.registers.update_status().description, "Split");
}

#[tokio::test]
async fn test_structured_lines_on_stderr_are_applied() {
    let h = harness(
        r#"
echo 'umbrel-update: {"description": "From stderr"}' >&2
"#,
    );

    assert!(h.runner.update().await.unwrap());
    assert_eq!(h.registers.update_status().description, "From stderr");
}

#[tokio::test]
async fn test_dots_on_stderr_drive_progress_while_running() {
    let h = harness(
        r#"
i=0
while [ $i -lt 35 ]; do echo . >&2; i=$((i+1)); done
sleep 2
"#,
    );

    let runner = Arc::clone(&h.runner);
    let attempt = tokio::spawn(async move { runner.update().await });

    let mut observed = 0;
    for _ in 0..75 {
        observed = h.registers.update_status().progress;
        if observed == 50 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(observed, 50);
    assert_eq!(h.registers.system_state(), SystemState::Updating);

    assert!(attempt.await.unwrap().unwrap());
    assert_eq!(h.registers.update_status().progress, FINAL_PROGRESS);
}

#[tokio::test]
async fn test_non_zero_exit_uses_generic_error() {
    let h = harness("echo 'installing'\nexit 1\n");

    assert!(!h.runner.update().await.unwrap());
    assert_failed_with(&h, GENERIC_UPDATE_ERROR);
    assert_eq!(h.services.stops(), 0);
}

#[tokio::test]
async fn test_script_reported_error_is_preserved() {
    let h = harness(
        r#"
echo 'umbrel-update: {"progress": 40, "error": "Not enough disk space"}'
exit 2
"#,
    );

    assert!(!h.runner.update().await.unwrap());
    assert_failed_with(&h, "Not enough disk space");
}

#[tokio::test]
async fn test_missing_update_script_fails_attempt() {
    let h = harness_with(
        StaticReleases::without_script(),
        RecordingServices::default(),
        RecordingPower::default(),
        None,
    );

    assert!(!h.runner.update().await.unwrap());
    assert_failed_with(&h, "No update script found");
}

#[tokio::test]
async fn test_release_outage_fails_attempt() {
    let h = harness_with(
        StaticReleases::unavailable(),
        RecordingServices::default(),
        RecordingPower::default(),
        None,
    );

    assert!(!h.runner.update().await.unwrap());
    assert_failed_with(&h, GENERIC_UPDATE_ERROR);
}

#[tokio::test]
async fn test_script_timeout_kills_attempt() {
    let h = harness_with(
        StaticReleases::with_script("sleep 30\n"),
        RecordingServices::default(),
        RecordingPower::default(),
        Some(Duration::from_millis(300)),
    );

    let started = std::time::Instant::now();
    assert!(!h.runner.update().await.unwrap());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_failed_with(&h, "Update script timed out after 300ms");
}

#[tokio::test]
async fn test_reboot_failure_is_reported() {
    let h = harness_with(
        StaticReleases::with_script("exit 0\n"),
        RecordingServices::default(),
        RecordingPower::failing(),
        None,
    );

    assert!(!h.runner.update().await.unwrap());

    let status = h.registers.update_status();
    assert!(!status.running);
    assert!(status
        .error
        .as_deref()
        .unwrap()
        .starts_with("Failed to reboot after update"));
    assert_eq!(h.registers.system_state(), SystemState::Running);
    assert_eq!(h.services.stops(), 1);
}

#[tokio::test]
async fn test_concurrent_update_is_rejected() {
    let h = harness("sleep 1\n");

    let runner = Arc::clone(&h.runner);
    let first = tokio::spawn(async move { runner.update().await });

    for _ in 0..50 {
        if h.registers.system_state() == SystemState::Updating {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let second = h.runner.update().await;
    assert!(matches!(second, Err(UmbreldError::SystemBusy { .. })));

    assert!(first.await.unwrap().unwrap());
    assert_eq!(h.power.reboots(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_update_and_shutdown_race_admits_one() {
    let data = tempfile::tempdir().unwrap();
    let h = harness("exit 0\n");
    let reset = Arc::new(FactoryReset::new(
        Arc::clone(&h.registers),
        h.services.clone(),
        h.power.clone(),
        data.path(),
        tokio_util::task::TaskTracker::new(),
    ));
    let controller = Arc::new(LifecycleController::new(
        Arc::clone(&h.registers),
        h.services.clone(),
        h.power.clone(),
        Arc::new(StaticAuthenticator::new(None, None)),
        reset,
    ));

    let runner = Arc::clone(&h.runner);
    let update = tokio::spawn(async move { runner.update().await });
    let shutdown = tokio::spawn(async move { controller.shutdown().await });

    let update = update.await.unwrap();
    let shutdown = shutdown.await.unwrap();
    assert!(update.is_ok() != shutdown.is_ok());
    assert_eq!(h.services.stops(), 1);
    assert_eq!(h.power.reboots() + h.power.power_offs(), 1);
}

#[tokio::test]
async fn test_update_rejected_while_shutting_down() {
    let h = harness("exit 0\n");
    h.registers.set_system_state(SystemState::ShuttingDown);

    let result = h.runner.update().await;
    assert!(matches!(result, Err(UmbreldError::SystemBusy { ref state }) if state == "shutting-down"));
    assert!(h.registers.update_status().is_idle());
    assert_eq!(h.registers.system_state(), SystemState::ShuttingDown);
}

#[tokio::test]
async fn test_update_can_be_retried_after_failure() {
    let h = harness("exit 1\n");
    assert!(!h.runner.update().await.unwrap());
    assert!(!h.runner.update().await.unwrap());
    assert_failed_with(&h, GENERIC_UPDATE_ERROR);
}
