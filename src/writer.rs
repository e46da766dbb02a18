//! Dedicated writer task for outbound frames.
//!
//! The connection's write half is owned by a single task that receives
//! encoded frames via an mpsc channel. Call tasks, the keepalive responder and
//! the router all share cheap [`WriterHandle`] clones instead of a mutex.
//!
//! # Architecture
//!
//! ```text
//! Call task 1 ─┐
//! Call task 2 ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► Pipe
//! Router      ─┘
//! ```
//!
//! Once the lifecycle reaches `Stopped` the task stops writing, shuts the
//! write half down and closes the channel; later sends fail with
//! [`PluginError::ConnectionClosed`].

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{PluginError, Result};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::protocol::{encode, Message};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 64;

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and can be shared across call tasks.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for encoded frames.
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue an encoded frame.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionClosed` once the writer task has exited.
    pub async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| PluginError::ConnectionClosed)
    }

    /// Encode and queue a message.
    pub async fn send_message(&self, msg: &Message) -> Result<()> {
        let frame = encode(msg)?;
        self.send(frame).await
    }

    /// Whether the writer task has exited.
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits when every handle is dropped, when the lifecycle stops,
/// or on a write error (which also stops the lifecycle).
pub fn spawn_writer_task<W>(
    writer: W,
    channel_capacity: usize,
    lifecycle: Lifecycle,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));

    let task = tokio::spawn(writer_loop(rx, writer, lifecycle));

    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them to the pipe.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<Bytes>,
    mut writer: W,
    lifecycle: Lifecycle,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut state = lifecycle.subscribe();

    let result = loop {
        let first = tokio::select! {
            biased;
            _ = state.wait_for(|s| *s == LifecycleState::Stopped) => break Ok(()),
            frame = rx.recv() => match frame {
                Some(f) => f,
                None => break Ok(()),
            },
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);

        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        // Nothing goes out after stop, even frames already dequeued.
        if lifecycle.is_stopped() {
            break Ok(());
        }

        if let Err(e) = write_batch(&mut writer, &batch).await {
            break Err(e);
        }
    };

    rx.close();
    let _ = writer.shutdown().await;

    if let Err(e) = &result {
        tracing::error!("Writer error: {}", e);
        lifecycle.stop();
    }

    result
}

/// Write a batch of frames using scatter/gather I/O (write_vectored).
async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(PluginError::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            )));
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

/// Build IoSlice array for remaining data after a partial write.
fn build_remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame[start..]));
        }
        offset = end;
    }

    slices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FrameBuffer, MessageType};
    use std::io::Cursor;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt};

    fn running() -> Lifecycle {
        let lifecycle = Lifecycle::new();
        lifecycle.advance(LifecycleState::Running);
        lifecycle
    }

    #[tokio::test]
    async fn test_send_message_reaches_peer() {
        let (client, mut server) = duplex(4096);
        let (handle, _task) = spawn_writer_task(client, 16, running());

        handle.send_message(&Message::pong("abc")).await.unwrap();

        let mut buf = vec![0u8; 256];
        let n = server.read(&mut buf).await.unwrap();

        let mut frames = FrameBuffer::new();
        let bodies = frames.push(&buf[..n]).unwrap();
        assert_eq!(bodies.len(), 1);
        let msg = crate::protocol::decode(&bodies[0]).unwrap();
        assert_eq!(msg.kind, MessageType::Pong);
        assert_eq!(msg.id, "abc");
    }

    #[tokio::test]
    async fn test_batching_preserves_all_frames() {
        let (client, mut server) = duplex(64 * 1024);
        let (handle, _task) = spawn_writer_task(client, 128, running());

        for i in 0..10 {
            handle
                .send_message(&Message::pong(i.to_string()))
                .await
                .unwrap();
        }

        let mut frames = FrameBuffer::new();
        let mut bodies = Vec::new();
        let mut buf = vec![0u8; 1024];
        while bodies.len() < 10 {
            let n = server.read(&mut buf).await.unwrap();
            assert!(n > 0);
            bodies.extend(frames.push(&buf[..n]).unwrap());
        }

        let ids: Vec<String> = bodies
            .iter()
            .map(|b| crate::protocol::decode(b).unwrap().id)
            .collect();
        let expected: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_stop_closes_writer() {
        let (client, mut server) = duplex(4096);
        let lifecycle = running();
        let (handle, task) = spawn_writer_task(client, 16, lifecycle.clone());

        lifecycle.stop();
        task.await.unwrap().unwrap();

        assert!(handle.is_closed());
        let result = handle.send_message(&Message::pong("late")).await;
        assert!(matches!(result, Err(PluginError::ConnectionClosed)));

        // Peer sees EOF without any frame.
        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_frames_queued_before_stop_are_discarded() {
        let (client, mut server) = duplex(4096);
        let lifecycle = running();
        let (handle, task) = spawn_writer_task(client, 16, lifecycle.clone());

        for id in ["a", "b", "c"] {
            handle.send_message(&Message::pong(id)).await.unwrap();
        }
        lifecycle.stop();
        task.await.unwrap().unwrap();

        let mut buf = vec![0u8; 256];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_shutdown_on_channel_close() {
        let (client, _server) = duplex(4096);
        let (handle, task) = spawn_writer_task(client, 16, running());

        drop(handle);

        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_write_error_stops_lifecycle() {
        let (client, server) = duplex(64);
        drop(server);

        let lifecycle = running();
        let (handle, task) = spawn_writer_task(client, 16, lifecycle.clone());

        handle.send_message(&Message::pong("x")).await.unwrap();
        let result = task.await.unwrap();

        assert!(result.is_err());
        assert!(lifecycle.is_stopped());
    }

    #[test]
    fn test_build_remaining_slices_no_skip() {
        let batch = vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")];
        let slices = build_remaining_slices(&batch, 0);
        assert_eq!(slices.len(), 2);
    }

    #[test]
    fn test_build_remaining_slices_partial_first() {
        let batch = vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")];
        let slices = build_remaining_slices(&batch, 3);
        assert_eq!(slices.len(), 2);
        assert_eq!(&*slices[0], b"lo");
        assert_eq!(&*slices[1], b"world");
    }

    #[test]
    fn test_build_remaining_slices_skip_first() {
        let batch = vec![Bytes::from_static(b"hello"), Bytes::from_static(b"world")];
        let slices = build_remaining_slices(&batch, 6);
        assert_eq!(slices.len(), 1);
        assert_eq!(&*slices[0], b"orld");
    }

    #[tokio::test]
    async fn test_write_batch_multiple() {
        let mut buf = Cursor::new(Vec::new());
        let batch: Vec<Bytes> = (0..5).map(|_| Bytes::from_static(b"abc")).collect();

        write_batch(&mut buf, &batch).await.unwrap();

        assert_eq!(buf.into_inner(), b"abcabcabcabcabc".to_vec());
    }
}
