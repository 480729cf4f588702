//! WebSocket-backed session transport
//!
//! Every connection gets one writer task that owns the socket's sink. Senders
//! queue [`OutboundFrame`]s and wait on a oneshot for the write result, so
//! frames are written whole, one at a time, in queue order.

use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot};

use crate::session::{Payload, SendError, SessionTransport};

/// Upper bound on waiting for queue space when closing
const CLOSE_ENQUEUE_TIMEOUT: Duration = Duration::from_secs(1);

type WriteAck = oneshot::Sender<Result<(), SendError>>;

pub enum OutboundFrame {
    Data { payload: Payload, done: WriteAck },
    Ping { done: WriteAck },
    Close,
}

pub struct WsTransport {
    frames: mpsc::Sender<OutboundFrame>,
}

impl WsTransport {
    /// Create a transport and the frame queue its writer task must drain
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { frames: tx }, rx)
    }

    async fn enqueue(
        &self,
        frame: OutboundFrame,
        written: oneshot::Receiver<Result<(), SendError>>,
    ) -> Result<(), SendError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| SendError::Closed)?;
        // A dropped ack means the writer exited before reaching this frame
        written.await.unwrap_or(Err(SendError::Closed))
    }
}

#[async_trait]
impl SessionTransport for WsTransport {
    async fn send(&self, payload: Payload) -> Result<(), SendError> {
        let (done, written) = oneshot::channel();
        self.enqueue(OutboundFrame::Data { payload, done }, written)
            .await
    }

    async fn ping(&self) -> Result<(), SendError> {
        let (done, written) = oneshot::channel();
        self.enqueue(OutboundFrame::Ping { done }, written).await
    }

    async fn close(&self) {
        let _ = tokio::time::timeout(CLOSE_ENQUEUE_TIMEOUT, self.frames.send(OutboundFrame::Close))
            .await;
    }
}

fn to_message(payload: Payload) -> Message {
    match payload {
        Payload::Text(text) => Message::Text(text.to_string().into()),
        Payload::Binary(bytes) => Message::Binary(bytes.to_vec().into()),
    }
}

async fn write<S>(sink: &mut S, message: Message, done: WriteAck) -> Result<(), SendError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let result = sink
        .send(message)
        .await
        .map_err(|e| SendError::Io(e.to_string()));
    let _ = done.send(result.clone());
    result
}

/// Drain `frames` into `sink` until a close frame, a write failure, or every
/// transport handle is dropped. Returns the write failure, if any.
pub async fn write_frames<S>(
    mut sink: S,
    mut frames: mpsc::Receiver<OutboundFrame>,
) -> Result<(), SendError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    while let Some(frame) = frames.recv().await {
        match frame {
            // The sender timed out or was dropped before the write began
            OutboundFrame::Data { done, .. } | OutboundFrame::Ping { done } if done.is_closed() => {
                tracing::debug!("Skipping frame abandoned by its sender");
            }
            OutboundFrame::Data { payload, done } => {
                write(&mut sink, to_message(payload), done).await?;
            }
            OutboundFrame::Ping { done } => {
                write(&mut sink, Message::Ping(Vec::new().into()), done).await?;
            }
            OutboundFrame::Close => {
                let _ = sink.send(Message::Close(None)).await;
                let _ = sink.close().await;
                return Ok(());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_frames_written_in_order() {
        let (transport, frames) = WsTransport::channel(8);
        let (sink, mut written) = futures::channel::mpsc::channel::<Message>(16);
        let writer = tokio::spawn(write_frames(sink, frames));

        transport.send(Payload::from("one")).await.unwrap();
        transport.send(Payload::binary(vec![1, 2])).await.unwrap();
        transport.ping().await.unwrap();
        transport.close().await;

        assert_eq!(written.next().await, Some(Message::Text("one".to_string().into())));
        assert_eq!(written.next().await, Some(Message::Binary(vec![1u8, 2].into())));
        assert!(matches!(written.next().await, Some(Message::Ping(_))));
        assert!(matches!(written.next().await, Some(Message::Close(None))));
        assert!(writer.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_abandoned_frame_not_written() {
        let (transport, frames) = WsTransport::channel(8);
        // Accepts one message, then blocks until the reader drains
        let (sink, mut written) = futures::channel::mpsc::channel::<Message>(1);
        tokio::spawn(write_frames(sink, frames));

        transport.send(Payload::from("first")).await.unwrap();

        // The writer is stuck on "second"; "third" gives up while still queued
        let wait = Duration::from_millis(50);
        assert!(tokio::time::timeout(wait, transport.send(Payload::from("second")))
            .await
            .is_err());
        assert!(tokio::time::timeout(wait, transport.send(Payload::from("third")))
            .await
            .is_err());

        assert_eq!(written.next().await, Some(Message::Text("first".to_string().into())));
        assert_eq!(written.next().await, Some(Message::Text("second".to_string().into())));

        transport.send(Payload::from("fourth")).await.unwrap();
        assert_eq!(written.next().await, Some(Message::Text("fourth".to_string().into())));
    }

    #[tokio::test]
    async fn test_send_after_writer_exit_is_closed() {
        let (transport, frames) = WsTransport::channel(8);
        let (sink, _written) = futures::channel::mpsc::channel::<Message>(16);
        let writer = tokio::spawn(write_frames(sink, frames));

        transport.close().await;
        writer.await.unwrap().unwrap();

        assert_eq!(transport.send(Payload::from("late")).await, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_write_failure_reported_to_sender() {
        let (transport, frames) = WsTransport::channel(8);
        let (sink, written) = futures::channel::mpsc::channel::<Message>(16);
        drop(written);
        let writer = tokio::spawn(write_frames(sink, frames));

        let err = transport.send(Payload::from("x")).await.unwrap_err();
        assert!(matches!(err, SendError::Io(_)));
        assert!(err.is_terminal());
        assert!(writer.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_sends_never_interleave() {
        let (transport, frames) = WsTransport::channel(4);
        let transport = Arc::new(transport);
        let (sink, written) = futures::channel::mpsc::channel::<Message>(256);
        tokio::spawn(write_frames(sink, frames));

        let payloads: Vec<String> = (0..20)
            .map(|i| format!("{}", i).repeat(1000))
            .collect();

        let sends: Vec<_> = payloads
            .iter()
            .cloned()
            .map(|p| {
                let transport = transport.clone();
                tokio::spawn(async move { transport.send(Payload::text(p)).await })
            })
            .collect();
        for send in sends {
            send.await.unwrap().unwrap();
        }
        transport.close().await;

        let received: Vec<Message> = written.collect().await;
        let texts: Vec<String> = received
            .into_iter()
            .filter_map(|m| match m {
                Message::Text(t) => Some(t.as_str().to_string()),
                _ => None,
            })
            .collect();

        assert_eq!(texts.len(), payloads.len());
        for text in &texts {
            assert!(payloads.contains(text));
        }
    }
}
