use crate::error::LifecycleError;
use tokio::process::Command;
use tracing::{debug, info};

/// Run an argv-style command to completion, failing on a non-zero exit
pub(crate) async fn run_command(argv: &[String]) -> Result<(), LifecycleError> {
    let (program, args) = argv.split_first().ok_or(LifecycleError::EmptyCommand)?;
    let command = argv.join(" ");

    info!("Running '{}'", command);
    let status = Command::new(program)
        .args(args)
        .status()
        .await
        .map_err(|source| LifecycleError::CommandSpawn {
            command: command.clone(),
            source,
        })?;

    if !status.success() {
        return Err(LifecycleError::CommandFailed {
            command,
            code: status.code(),
        });
    }

    debug!("'{}' completed", command);
    Ok(())
}
