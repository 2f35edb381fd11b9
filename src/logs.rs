use crate::config::LogsConfig;
use crate::error::{Result, UmbreldError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tokio::process::Command;
use tracing::{debug, warn};

/// Which journal the `logs` procedure reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSource {
    Umbrel,
    System,
}

/// Reads the tail of a journal with terminal escapes removed
#[derive(Debug, Clone)]
pub struct LogReader {
    umbrel_unit: String,
    lines: usize,
}

impl LogReader {
    pub fn new(umbrel_unit: impl Into<String>, lines: usize) -> Self {
        Self {
            umbrel_unit: umbrel_unit.into(),
            lines,
        }
    }

    pub fn from_config(config: &LogsConfig) -> Self {
        Self::new(config.umbrel_unit.clone(), config.lines)
    }

    pub fn journalctl_args(&self, source: LogSource) -> Vec<String> {
        let mut args = Vec::new();
        if source == LogSource::Umbrel {
            args.push("--unit".to_string());
            args.push(self.umbrel_unit.clone());
        }
        args.extend([
            "--lines".to_string(),
            self.lines.to_string(),
            "--no-pager".to_string(),
        ]);
        args
    }

    pub async fn read(&self, source: LogSource) -> Result<String> {
        let args = self.journalctl_args(source);
        debug!("Reading logs: journalctl {}", args.join(" "));

        let output = Command::new("journalctl")
            .args(&args)
            .output()
            .await
            .map_err(|e| UmbreldError::component("logs", format!("failed to run journalctl: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("journalctl exited with {}: {}", output.status, stderr.trim());
            return Err(UmbreldError::component(
                "logs",
                format!("journalctl exited with {}", output.status),
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(tail_lines(&strip_ansi(&text), self.lines))
    }
}

fn ansi_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-_]")
            .expect("ANSI pattern is valid")
    })
}

/// Remove CSI and OSC escape sequences
pub fn strip_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}

/// Keep only the last `n` lines
pub fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}
