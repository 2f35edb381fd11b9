mod output;
mod protocol;
mod runner;
#[cfg(test)]
mod tests;

pub use output::{output_chunks, output_lines, LineBuffer, OutputChunk, OutputLine, OutputStream};
pub use protocol::{
    dot_progress, LineOutcome, ProgressInterpreter, EXPECTED_DOTS, PROGRESS_DOT, STATUS_MARKER,
};
pub use runner::{UpdateRunner, FINAL_PROGRESS};
