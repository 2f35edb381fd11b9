use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use std::io;
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

/// Which pipe a chunk or line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Raw bytes as delivered by one read of a pipe. No line alignment.
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub data: Bytes,
}

/// One reassembled line, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Merge both pipes into a single lazy chunk sequence.
///
/// Chunks keep their per-pipe order; there is no ordering between pipes. The
/// sequence ends once both pipes reach EOF.
pub fn output_chunks<O, E>(stdout: O, stderr: E) -> impl Stream<Item = io::Result<OutputChunk>>
where
    O: AsyncRead + Unpin,
    E: AsyncRead + Unpin,
{
    let stdout = ReaderStream::new(stdout).map(|data| {
        data.map(|data| OutputChunk {
            stream: OutputStream::Stdout,
            data,
        })
    });
    let stderr = ReaderStream::new(stderr).map(|data| {
        data.map(|data| OutputChunk {
            stream: OutputStream::Stderr,
            data,
        })
    });

    stream::select(stdout, stderr)
}

/// Turn a chunk sequence into a line sequence.
///
/// Each pipe has its own partial-line buffer, so a line split across chunks is
/// rejoined and a chunk holding several lines yields them all. Whatever is
/// left in a buffer once the chunks run out is emitted as a final line.
pub fn output_lines<S>(chunks: S) -> impl Stream<Item = io::Result<OutputLine>>
where
    S: Stream<Item = io::Result<OutputChunk>>,
{
    async_stream::try_stream! {
        futures::pin_mut!(chunks);
        let mut stdout = LineBuffer::default();
        let mut stderr = LineBuffer::default();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            let buffer = match chunk.stream {
                OutputStream::Stdout => &mut stdout,
                OutputStream::Stderr => &mut stderr,
            };
            for text in buffer.push(&chunk.data) {
                yield OutputLine { stream: chunk.stream, text };
            }
        }

        if let Some(text) = stdout.finish() {
            yield OutputLine { stream: OutputStream::Stdout, text };
        }
        if let Some(text) = stderr.finish() {
            yield OutputLine { stream: OutputStream::Stderr, text };
        }
    }
}

/// Longest partial line held before it is emitted in pieces
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Reassembles newline-terminated lines from arbitrary byte chunks
#[derive(Debug, Default)]
pub struct LineBuffer {
    // Never holds a newline or more than MAX_LINE_BYTES between pushes
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Append a chunk and return every line it completed
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        let mut scan_from = self.pending.len();
        self.pending.extend_from_slice(data);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.pending[scan_from..].iter().position(|&b| b == b'\n') {
            let end = scan_from + offset;
            lines.push(decode_line(&self.pending[start..end]));
            start = end + 1;
            scan_from = start;
        }

        while self.pending.len() - start > MAX_LINE_BYTES {
            let end = start + MAX_LINE_BYTES;
            lines.push(decode_line(&self.pending[start..end]));
            start = end;
        }
        self.pending.drain(..start);

        lines
    }

    /// Flush an unterminated trailing line
    pub fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let line = decode_line(&self.pending);
        self.pending.clear();
        Some(line)
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
