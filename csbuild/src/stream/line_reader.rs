//! Line Stream Reader: turns a chunked child output stream into logical lines.

use super::strip_ansi;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Size of a single read from a child pipe.
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// One complete line of child output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    /// The line with ANSI escape sequences removed, used for matching.
    pub stripped: String,
    /// The line exactly as the child wrote it, used for echoing.
    pub raw: String,
}

impl OutputLine {
    /// Builds a line from its raw bytes (without the trailing newline).
    #[must_use]
    pub fn from_raw_bytes(bytes: &[u8]) -> Self {
        let raw = String::from_utf8_lossy(bytes).into_owned();
        let stripped = strip_ansi(&raw).into_owned();
        Self { stripped, raw }
    }

    /// Returns true if the stripped line contains the marker.
    #[must_use]
    pub fn contains(&self, marker: &str) -> bool {
        self.stripped.contains(marker)
    }

    /// Returns true if the stripped line is empty.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.stripped.trim().is_empty()
    }
}

/// The unterminated tail of a stream between chunks.
///
/// Works on bytes so a UTF-8 character split across two chunks is decoded
/// only once its line is complete.
#[derive(Debug, Default)]
pub struct LineBuffer {
    tail: Vec<u8>,
}

impl LineBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every line it completed.
    ///
    /// A trailing segment without a newline is held back until a later chunk
    /// completes it or [`LineBuffer::finish`] flushes it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<OutputLine> {
        self.tail.extend_from_slice(chunk);

        let Some(last_newline) = self.tail.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.tail.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.tail, rest);

        complete[..last_newline]
            .split(|b| *b == b'\n')
            .map(OutputLine::from_raw_bytes)
            .collect()
    }

    /// Flushes the pending tail as a final line, if any.
    pub fn finish(&mut self) -> Option<OutputLine> {
        if self.tail.is_empty() {
            return None;
        }
        let tail = std::mem::take(&mut self.tail);
        Some(OutputLine::from_raw_bytes(&tail))
    }

    /// Returns the bytes currently held back.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.tail
    }
}

/// Attaches a reader task to a child stream.
///
/// Every completed line is passed to `on_line` in the order it was written.
/// At end of stream a non-empty partial tail is flushed as a last line.
/// Aborting the returned handle detaches the listener.
pub fn attach<R, F>(mut reader: R, label: &'static str, mut on_line: F) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    F: FnMut(OutputLine) + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = LineBuffer::new();
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            match reader.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    for line in buffer.push(&chunk[..n]) {
                        on_line(line);
                    }
                }
                Err(e) => {
                    warn!(stream = label, error = %e, "Failed to read child output");
                    break;
                }
            }
        }

        if let Some(line) = buffer.finish() {
            on_line(line);
        }
        debug!(stream = label, "Output stream closed");
    })
}

/// Copies a child stream to a writer unchanged, chunk by chunk.
pub fn passthrough<R, W>(mut reader: R, mut writer: W, label: &'static str) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = tokio::io::copy(&mut reader, &mut writer).await {
            warn!(stream = label, error = %e, "Failed to forward child output");
        }
        let _ = writer.flush().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    fn stripped(lines: &[OutputLine]) -> Vec<&str> {
        lines.iter().map(|l| l.stripped.as_str()).collect()
    }

    #[test]
    fn test_partial_line_is_withheld() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.push(b"Starting watch").is_empty());
        assert_eq!(buffer.pending(), b"Starting watch");

        let lines = buffer.push(b"-client\nFinished");
        assert_eq!(stripped(&lines), vec!["Starting watch-client"]);
        assert_eq!(buffer.pending(), b"Finished");
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"one\ntwo\n\nthree\n");

        assert_eq!(stripped(&lines), vec!["one", "two", "", "three"]);
        assert!(buffer.pending().is_empty());
        assert!(buffer.finish().is_none());
    }

    #[test]
    fn test_stripped_and_raw_are_both_kept() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"\x1b[32mWatching for file changes.\x1b[39m\n");

        assert_eq!(lines[0].stripped, "Watching for file changes.");
        assert_eq!(lines[0].raw, "\x1b[32mWatching for file changes.\x1b[39m");
        assert!(lines[0].contains("Watching for file changes"));
    }

    #[test]
    fn test_split_utf8_character_is_reassembled() {
        let text = "build \u{2714} done\n".as_bytes();
        let split = text.iter().position(|b| *b == 0xE2).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        assert!(buffer.push(&text[..split]).is_empty());
        let lines = buffer.push(&text[split..]);

        assert_eq!(lines[0].raw, "build \u{2714} done");
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut buffer = LineBuffer::new();
        buffer.push(b"no newline at end");
        let line = buffer.finish().unwrap();

        assert_eq!(line.raw, "no newline at end");
        assert!(buffer.finish().is_none());
    }

    #[tokio::test]
    async fn test_attach_delivers_lines_in_order() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();

        let handle = attach(reader, "test", move |line| sink.lock().push(line.stripped));

        writer.write_all(b"first\nsec").await.unwrap();
        writer.write_all(b"ond\n\x1b[1mthird\x1b[0m\ntail").await.unwrap();
        drop(writer);
        handle.await.unwrap();

        assert_eq!(*seen.lock(), vec!["first", "second", "third", "tail"]);
    }

    #[tokio::test]
    async fn test_passthrough_copies_bytes() {
        let (mut writer, reader) = tokio::io::duplex(64);
        let (out_writer, mut out_reader) = tokio::io::duplex(64);

        let handle = passthrough(reader, out_writer, "stderr");
        writer.write_all(b"\x1b[31merror\x1b[0m\n").await.unwrap();
        drop(writer);
        handle.await.unwrap();

        let mut copied = Vec::new();
        out_reader.read_to_end(&mut copied).await.unwrap();
        assert_eq!(copied, b"\x1b[31merror\x1b[0m\n");
    }

    fn stream_strategy() -> impl Strategy<Value = Vec<u8>> {
        let piece = prop_oneof![
            Just(b"\n".to_vec()),
            Just(b"\x1b[32m".to_vec()),
            Just(b"\x1b[0m".to_vec()),
            Just(b"\x1b(B".to_vec()),
            Just("\u{2714}".as_bytes().to_vec()),
            "[a-zA-Z .:]{1,12}".prop_map(String::into_bytes),
        ];
        prop::collection::vec(piece, 0..40).prop_map(|pieces| pieces.concat())
    }

    proptest! {
        #[test]
        fn prop_fragmentation_does_not_change_lines(
            stream in stream_strategy(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..10),
        ) {
            let mut points: Vec<usize> = cuts.iter().map(|i| i.index(stream.len() + 1)).collect();
            points.sort_unstable();
            points.dedup();

            let mut buffer = LineBuffer::new();
            let mut emitted = Vec::new();
            let mut start = 0;
            for point in points.into_iter().chain(std::iter::once(stream.len())) {
                emitted.extend(buffer.push(&stream[start..point]));
                start = point;
            }

            let text = String::from_utf8_lossy(&stream).into_owned();
            let mut expected: Vec<&str> = text.split('\n').collect();
            expected.pop();

            let got: Vec<String> = emitted.iter().map(|l| l.stripped.clone()).collect();
            let want: Vec<String> = expected.iter().map(|l| strip_ansi(l).into_owned()).collect();
            prop_assert_eq!(got, want);
            prop_assert!(emitted.iter().all(|l| !l.stripped.contains('\x1b')));
        }
    }
}
