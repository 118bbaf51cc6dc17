//! Line-buffered reading of companion output pipes

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

use teamradar_core::events::{BridgeEvent, ProcessId, StreamKind};
use teamradar_core::prelude::*;

/// Upper bound for a single read from a pipe
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Accumulates raw bytes and splits off complete lines.
///
/// Bytes after the last `\n` stay buffered until more data arrives. A trailing
/// `\r` is removed from each line and invalid UTF-8 is replaced rather than
/// rejected.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed, in arrival order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        // Only the new bytes can contain a terminator we have not seen yet.
        let scan_from = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search = scan_from;
        while let Some(pos) = self.pending[search..].iter().position(|&b| b == b'\n') {
            let end = search + pos;
            let raw = &self.pending[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            lines.push(String::from_utf8_lossy(raw).into_owned());
            start = end + 1;
            search = start;
        }

        self.pending.drain(..start);
        lines
    }

    /// Number of bytes waiting for a terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop the unterminated tail, returning how many bytes were discarded.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }
}

/// Persistent reader for one output pipe of one companion launch.
///
/// Emits [`BridgeEvent::Line`] for every complete line and exactly one
/// [`BridgeEvent::StreamClosed`] when the pipe ends or fails. An unterminated
/// final fragment is never emitted. If the receiving side goes away the reader
/// stops quietly.
pub struct StreamReader {
    process: ProcessId,
    stream: StreamKind,
    buffer: LineBuffer,
}

impl StreamReader {
    pub fn new(process: ProcessId, stream: StreamKind) -> Self {
        Self {
            process,
            stream,
            buffer: LineBuffer::new(),
        }
    }

    /// Read until end-of-data, forwarding lines to `tx`.
    pub async fn run<R>(mut self, mut source: R, tx: mpsc::Sender<BridgeEvent>)
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            let read = match source.read(&mut chunk).await {
                Ok(0) => {
                    debug!("{} {} reached end of data", self.process, self.stream);
                    break;
                }
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("{} {} read failed: {}", self.process, self.stream, e);
                    break;
                }
            };

            for line in self.buffer.push(&chunk[..read]) {
                trace!("{} {}: {}", self.process, self.stream, line);

                let event = BridgeEvent::Line {
                    process: self.process,
                    stream: self.stream,
                    line,
                };
                if tx.send(event).await.is_err() {
                    debug!("{} {} channel closed", self.process, self.stream);
                    return;
                }
            }
        }

        let dropped = self.buffer.discard();
        if dropped > 0 {
            debug!(
                "{} {} discarded {} bytes of unterminated output",
                self.process, self.stream, dropped
            );
        }

        let _ = tx
            .send(BridgeEvent::StreamClosed {
                process: self.process,
                stream: self.stream,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(rx: &mut mpsc::Receiver<BridgeEvent>) -> (Vec<String>, usize) {
        let mut lines = Vec::new();
        let mut closed = 0;
        while let Ok(event) = rx.try_recv() {
            match event {
                BridgeEvent::Line { line, .. } => lines.push(line),
                BridgeEvent::StreamClosed { .. } => closed += 1,
                other => panic!("unexpected event: {:?}", other),
            }
        }
        (lines, closed)
    }

    // ─────────────────────────────────────────────────────────
    // LineBuffer
    // ─────────────────────────────────────────────────────────

    #[test]
    fn test_line_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"abc\ndef"), vec!["abc"]);
        assert_eq!(buffer.pending_len(), 3);
        assert_eq!(buffer.push(b"gh\n"), vec!["defgh"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"a\nb\n\nc"), vec!["a", "b", ""]);
        assert_eq!(buffer.push(b"\n"), vec!["c"]);
    }

    #[test]
    fn test_crlf_is_trimmed() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"rooms remove 1\r\n"), vec!["rooms remove 1"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"caf\xff\n");
        assert_eq!(lines, vec!["caf\u{fffd}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut buffer = LineBuffer::new();
        let bytes = "é\n".as_bytes();
        assert!(buffer.push(&bytes[..1]).is_empty());
        assert_eq!(buffer.push(&bytes[1..]), vec!["é"]);
    }

    #[test]
    fn test_discard_drops_tail() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"partial").is_empty());
        assert_eq!(buffer.discard(), 7);
        assert_eq!(buffer.pending_len(), 0);
    }

    // ─────────────────────────────────────────────────────────
    // StreamReader
    // ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_reader_preserves_order_across_reads() {
        let source = tokio_test::io::Builder::new()
            .read(b"abc\ndef")
            .read(b"gh\n")
            .build();
        let (tx, mut rx) = mpsc::channel(16);

        StreamReader::new(ProcessId(1), StreamKind::Stdout)
            .run(source, tx)
            .await;

        let (lines, closed) = collect(&mut rx);
        assert_eq!(lines, vec!["abc", "defgh"]);
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_reader_drops_unterminated_tail_on_close() {
        let source = tokio_test::io::Builder::new()
            .read(b"first\nsecond")
            .build();
        let (tx, mut rx) = mpsc::channel(16);

        StreamReader::new(ProcessId(1), StreamKind::Stderr)
            .run(source, tx)
            .await;

        let (lines, closed) = collect(&mut rx);
        assert_eq!(lines, vec!["first"]);
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_reader_closes_once_on_read_error() {
        let source = tokio_test::io::Builder::new()
            .read(b"ok\n")
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let (tx, mut rx) = mpsc::channel(16);

        StreamReader::new(ProcessId(2), StreamKind::Stdout)
            .run(source, tx)
            .await;

        let (lines, closed) = collect(&mut rx);
        assert_eq!(lines, vec!["ok"]);
        assert_eq!(closed, 1);
    }

    #[tokio::test]
    async fn test_reader_tags_events() {
        let source = tokio_test::io::Builder::new().read(b"x\n").build();
        let (tx, mut rx) = mpsc::channel(16);

        StreamReader::new(ProcessId(9), StreamKind::Stderr)
            .run(source, tx)
            .await;

        match rx.try_recv() {
            Ok(BridgeEvent::Line {
                process, stream, ..
            }) => {
                assert_eq!(process, ProcessId(9));
                assert_eq!(stream, StreamKind::Stderr);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reader_stops_when_receiver_dropped() {
        let source = tokio_test::io::Builder::new().read(b"a\nb\n").build();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        // Must return instead of blocking forever.
        StreamReader::new(ProcessId(1), StreamKind::Stdout)
            .run(source, tx)
            .await;
    }
}
