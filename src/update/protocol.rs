use crate::status::UpdateStatusPatch;
use tracing::{debug, warn};

/// Prefix of a line carrying a JSON-encoded partial update status
pub const STATUS_MARKER: &str = "umbrel-update: ";

/// A line consisting only of this counts towards install progress
pub const PROGRESS_DOT: &str = ".";

/// Number of dots a full install is expected to print
pub const EXPECTED_DOTS: u32 = 70;

const DOT_PROGRESS_START: u64 = 5;
const DOT_PROGRESS_SPAN: u64 = 90;
const DOT_PROGRESS_CAP: u64 = 95;

/// Map a dot count onto the 5..=95 progress band
pub fn dot_progress(dots: u32) -> u8 {
    let scaled = u64::from(dots) * DOT_PROGRESS_SPAN / u64::from(EXPECTED_DOTS);
    (scaled + DOT_PROGRESS_START).min(DOT_PROGRESS_CAP) as u8
}

/// What a single output line meant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Structured status update to merge
    Status(UpdateStatusPatch),
    /// A progress dot; carries the new progress value
    Progress(u8),
    /// Marker line whose payload was not a valid status object
    Malformed(String),
    /// Anything else
    Ignored,
}

impl LineOutcome {
    pub fn into_patch(self) -> Option<UpdateStatusPatch> {
        match self {
            LineOutcome::Status(patch) => Some(patch),
            LineOutcome::Progress(progress) => Some(UpdateStatusPatch::progress(progress)),
            LineOutcome::Malformed(_) | LineOutcome::Ignored => None,
        }
    }
}

/// Interprets the update script's output sub-protocol.
///
/// One interpreter serves both stdout and stderr, so dots from either pipe
/// count towards the same total.
#[derive(Debug, Default)]
pub struct ProgressInterpreter {
    dots: u32,
}

impl ProgressInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dots(&self) -> u32 {
        self.dots
    }

    pub fn interpret(&mut self, line: &str) -> LineOutcome {
        if let Some(payload) = line.strip_prefix(STATUS_MARKER) {
            return match serde_json::from_str::<UpdateStatusPatch>(payload) {
                Ok(patch) => {
                    debug!("Structured update status: {:?}", patch);
                    LineOutcome::Status(patch)
                }
                Err(e) => {
                    warn!("Ignoring malformed update status line {:?}: {}", payload, e);
                    LineOutcome::Malformed(e.to_string())
                }
            };
        }

        if line == PROGRESS_DOT {
            self.dots = self.dots.saturating_add(1);
            return LineOutcome::Progress(dot_progress(self.dots));
        }

        LineOutcome::Ignored
    }
}
