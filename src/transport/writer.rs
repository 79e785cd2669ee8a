//! Dedicated writer task for a WebSocket connection.
//!
//! Sessions, handler tasks and the retry drain all send frames. Instead of
//! sharing the socket's sink behind a lock, every sender pushes into an mpsc
//! channel and one task owns the sink.
//!
//! # Architecture
//!
//! ```text
//! Session      ─┐
//! Handler N    ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► WebSocket sink
//! Retry drain  ─┘
//! ```
//!
//! Frames that arrive together are fed into the sink as a batch and flushed
//! once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use crate::error::{OcppError, Result};

/// Default maximum pending frames before sends are refused.
pub const DEFAULT_MAX_PENDING_FRAMES: usize = 1024;

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames fed into the sink before a flush.
const MAX_BATCH_SIZE: usize = 64;

/// Command for the writer task.
#[derive(Debug)]
enum Outbound {
    /// A text frame.
    Text(Bytes),
    /// Send a close frame and stop.
    Close,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Maximum pending frames before sends fail with `Backpressure`.
    pub max_pending_frames: usize,
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_pending_frames: DEFAULT_MAX_PENDING_FRAMES,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// Cheap to clone. Sending never waits: the engine's send path is
/// synchronous, so a full queue is reported instead of awaited.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Outbound>,
    pending: Arc<AtomicUsize>,
    max_pending: usize,
}

impl WriterHandle {
    fn new(tx: mpsc::Sender<Outbound>, pending: Arc<AtomicUsize>, max_pending: usize) -> Self {
        Self {
            tx,
            pending,
            max_pending,
        }
    }

    /// Queue a text frame.
    ///
    /// Fails with [`OcppError::Backpressure`] when too many frames are
    /// pending and with [`OcppError::NotConnected`] once the task stopped.
    pub fn send(&self, frame: Bytes) -> Result<()> {
        if self.pending.load(Ordering::Acquire) >= self.max_pending {
            return Err(OcppError::Backpressure);
        }

        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.try_send(Outbound::Text(frame)).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::Release);
            match e {
                mpsc::error::TrySendError::Full(_) => OcppError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => OcppError::NotConnected,
            }
        })
    }

    /// Ask the task to send a close frame after the frames already queued.
    pub fn close(&self) {
        if self.tx.try_send(Outbound::Close).is_err() {
            tracing::debug!("writer queue full or gone, closing without close frame");
        }
    }

    /// Check if sends are currently refused.
    #[inline]
    pub fn is_backpressure_active(&self) -> bool {
        self.pending.load(Ordering::Acquire) >= self.max_pending
    }

    /// Get current pending frame count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }
}

/// Spawn the writer task for `sink` and return a handle for sending frames.
///
/// The task ends when every handle is dropped, after a close frame, or on
/// the first sink error (which the `JoinHandle` returns).
pub fn spawn_writer_task<S>(sink: S, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle::new(tx, pending.clone(), config.max_pending_frames);
    let task = tokio::spawn(writer_loop(rx, sink, pending));

    (handle, task)
}

/// Main writer loop - receives frames and feeds them to the sink.
async fn writer_loop<S>(
    mut rx: mpsc::Receiver<Outbound>,
    mut sink: S,
    pending: Arc<AtomicUsize>,
) -> Result<()>
where
    S: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    loop {
        let Some(first) = rx.recv().await else {
            // Every handle dropped.
            return Ok(());
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(command) => batch.push(command),
                Err(_) => break,
            }
        }

        let mut closing = false;
        let mut frames = 0;
        for command in batch {
            match command {
                Outbound::Text(frame) => {
                    frames += 1;
                    sink.feed(text_message(frame)).await?;
                }
                Outbound::Close => {
                    closing = true;
                    break;
                }
            }
        }
        sink.flush().await?;
        pending.fetch_sub(frames, Ordering::Release);

        if closing {
            sink.send(WsMessage::Close(None)).await?;
            sink.close().await?;
            return Ok(());
        }
    }
}

fn text_message(frame: Bytes) -> WsMessage {
    WsMessage::text(String::from_utf8_lossy(&frame).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc as fmpsc;
    use futures::StreamExt;

    fn test_sink() -> (
        impl Sink<WsMessage, Error = tungstenite::Error> + Unpin + Send + 'static,
        fmpsc::UnboundedReceiver<WsMessage>,
    ) {
        let (tx, rx) = fmpsc::unbounded();
        (
            tx.sink_map_err(|_| tungstenite::Error::ConnectionClosed),
            rx,
        )
    }

    #[test]
    fn test_writer_config_default() {
        let config = WriterConfig::default();
        assert_eq!(config.max_pending_frames, DEFAULT_MAX_PENDING_FRAMES);
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
    }

    #[tokio::test]
    async fn test_frames_arrive_in_order() {
        let (sink, mut written) = test_sink();
        let (handle, _task) = spawn_writer_task(sink, WriterConfig::default());

        for i in 0..10 {
            handle.send(Bytes::from(format!("[2,\"{}\",\"Heartbeat\",{{}}]", i))).unwrap();
        }

        for i in 0..10 {
            let msg = written.next().await.unwrap();
            assert!(msg.is_text());
            assert_eq!(
                msg.into_text().unwrap().as_str(),
                format!("[2,\"{}\",\"Heartbeat\",{{}}]", i)
            );
        }
    }

    #[tokio::test]
    async fn test_pending_count_drains() {
        let (sink, mut written) = test_sink();
        let (handle, _task) = spawn_writer_task(sink, WriterConfig::default());

        handle.send(Bytes::from_static(b"[]")).unwrap();
        written.next().await.unwrap();
        tokio::task::yield_now().await;

        assert_eq!(handle.pending_count(), 0);
        assert!(!handle.is_backpressure_active());
    }

    #[tokio::test]
    async fn test_send_at_capacity() {
        let (tx, _rx) = mpsc::channel::<Outbound>(10);
        let pending = Arc::new(AtomicUsize::new(100));
        let handle = WriterHandle::new(tx, pending, 100);

        let result = handle.send(Bytes::from_static(b"[]"));
        assert!(matches!(result, Err(OcppError::Backpressure)));
    }

    #[tokio::test]
    async fn test_send_after_task_stopped() {
        let (tx, rx) = mpsc::channel::<Outbound>(10);
        drop(rx);
        let handle = WriterHandle::new(tx, Arc::new(AtomicUsize::new(0)), 100);

        assert!(matches!(
            handle.send(Bytes::from_static(b"[]")),
            Err(OcppError::NotConnected)
        ));
        assert_eq!(handle.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_close_sends_close_frame_after_queued_frames() {
        let (sink, mut written) = test_sink();
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());

        handle.send(Bytes::from_static(b"[3,\"1\",{}]")).unwrap();
        handle.close();

        assert!(written.next().await.unwrap().is_text());
        assert!(written.next().await.unwrap().is_close());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_writer_shutdown_on_channel_close() {
        let (sink, _written) = test_sink();
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());

        drop(handle);

        let result = task.await.unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_sink_error_stops_task() {
        let (sink, written) = test_sink();
        drop(written);
        let (handle, task) = spawn_writer_task(sink, WriterConfig::default());

        handle.send(Bytes::from_static(b"[]")).unwrap();

        assert!(matches!(task.await.unwrap(), Err(OcppError::WebSocket(_))));
    }
}
