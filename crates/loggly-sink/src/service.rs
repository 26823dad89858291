// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Actor wrapper around [`BatchingSink`].
//!
//! The service task owns the sink and processes commands one at a time, so
//! events are buffered in the order they are received and at most one flush
//! is ever in flight. Producers talk to it through cloneable
//! [`SinkHandle`]s:
//!
//! ```text
//!    ┌──────────────┐
//!    │ SinkHandles  │  accept(event) ──▶ ack
//!    └──────┬───────┘
//!           │ commands (bounded mpsc)
//!           v
//!    ┌──────────────┐
//!    │ SinkService  │  owns the sink
//!    └──────┬───────┘
//!           v
//!    ┌──────────────┐
//!    │ BatchingSink │
//!    └──────────────┘
//! ```
//!
//! The end of the stream is either an explicit [`SinkHandle::close`], every
//! handle being dropped, or the cancellation token firing. In all three
//! cases the sink gets its final flush before the service stops.
//!
//! ```rust,ignore
//! let (service, handle) = SinkService::new(BatchingSink::new(config)?);
//! let task = tokio::spawn(service.run());
//!
//! handle.accept(json!({ "event": "log" })).await?;
//! handle.close().await?;
//! task.await?;
//! ```

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::client::LogglyClient;
use crate::constants::SINK_CHANNEL_CAPACITY;
use crate::sender::BatchSender;
use crate::sink::{BatchingSink, SinkError};

#[derive(Debug)]
pub enum SinkCommand {
    /// Buffer one event; the acknowledgement carries the flush outcome when
    /// this event triggered one.
    Accept(Value, oneshot::Sender<Result<(), SinkError>>),
    /// Final flush, answered once it completes.
    Close(oneshot::Sender<()>),
}

#[derive(Clone, Debug)]
pub struct SinkHandle {
    tx: mpsc::Sender<SinkCommand>,
}

impl SinkHandle {
    /// Sends one event and waits for its acknowledgement.
    pub async fn accept(&self, event: Value) -> Result<(), SinkError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Accept(event, ack_tx))
            .await
            .map_err(|e| SinkError::ServiceUnavailable(format!("Failed to send event: {e}")))?;

        ack_rx.await.map_err(|e| {
            SinkError::ServiceUnavailable(format!("Failed to receive acknowledgement: {e}"))
        })?
    }

    /// Signals the end of the stream and waits for the final flush.
    pub async fn close(&self) -> Result<(), SinkError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(SinkCommand::Close(done_tx))
            .await
            .map_err(|e| SinkError::ServiceUnavailable(format!("Failed to send close: {e}")))?;

        done_rx.await.map_err(|e| {
            SinkError::ServiceUnavailable(format!("Failed to receive close response: {e}"))
        })
    }
}

pub struct SinkService<S = LogglyClient> {
    sink: BatchingSink<S>,
    rx: mpsc::Receiver<SinkCommand>,
    cancel_token: CancellationToken,
}

impl<S: BatchSender> SinkService<S> {
    /// Wraps `sink` in a service. Spawn [`SinkService::run`] and use the
    /// handle to feed it.
    #[must_use]
    pub fn new(sink: BatchingSink<S>) -> (Self, SinkHandle) {
        Self::with_capacity(sink, SINK_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(sink: BatchingSink<S>, capacity: usize) -> (Self, SinkHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let service = SinkService {
            sink,
            rx,
            cancel_token: CancellationToken::new(),
        };
        (service, SinkHandle { tx })
    }

    /// Token that stops the service. Commands already queued are still
    /// processed before the final flush.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Processes commands until the stream ends, then closes the sink.
    pub async fn run(mut self) {
        debug!("LOGGLY | Sink service started");

        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(SinkCommand::Accept(event, ack)) => {
                        let result = self.sink.accept(event).await;
                        if ack.send(result).is_err() {
                            debug!("LOGGLY | Acknowledgement receiver dropped");
                        }
                    }
                    Some(SinkCommand::Close(done)) => {
                        self.sink.close().await;
                        if done.send(()).is_err() {
                            debug!("LOGGLY | Close receiver dropped");
                        }
                        break;
                    }
                    None => {
                        debug!("LOGGLY | All sink handles dropped, closing sink");
                        self.sink.close().await;
                        break;
                    }
                },
                () = self.cancel_token.cancelled() => {
                    debug!("LOGGLY | Received shutdown signal, draining remaining events");
                    self.drain().await;
                    self.sink.close().await;
                    break;
                }
            }
        }

        debug!("LOGGLY | Sink service stopped");
    }

    async fn drain(&mut self) {
        self.rx.close();
        while let Ok(command) = self.rx.try_recv() {
            match command {
                SinkCommand::Accept(event, ack) => {
                    let result = self.sink.accept(event).await;
                    if ack.send(result).is_err() {
                        debug!("LOGGLY | Acknowledgement receiver dropped");
                    }
                }
                SinkCommand::Close(done) => {
                    self.sink.close().await;
                    if done.send(()).is_err() {
                        error!("LOGGLY | Failed to answer close request, receiver dropped");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sink::tests::{settings, RecordingSender};
    use serde_json::json;
    use std::sync::Arc;

    fn spawn_service(
        threshold: u64,
        sender: &Arc<RecordingSender>,
    ) -> (SinkHandle, tokio::task::JoinHandle<()>) {
        let sink = BatchingSink::with_sender(settings(threshold), Arc::clone(sender));
        let (service, handle) = SinkService::new(sink);
        (handle, tokio::spawn(service.run()))
    }

    #[tokio::test]
    async fn test_accept_batches_through_handle() {
        let sender = Arc::new(RecordingSender::default());
        let (handle, task) = spawn_service(5, &sender);

        for id in 0..10 {
            handle.accept(json!({ "id": id })).await.unwrap();
        }
        assert_eq!(sender.batch_sizes(), vec![5, 5]);

        handle.close().await.unwrap();
        task.await.unwrap();
        assert_eq!(sender.batch_sizes(), vec![5, 5]);
    }

    #[tokio::test]
    async fn test_close_performs_final_flush() {
        let sender = Arc::new(RecordingSender::default());
        let (handle, task) = spawn_service(10, &sender);

        handle.accept(json!({ "id": 1 })).await.unwrap();
        handle.accept(json!({ "id": 2 })).await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(sender.batch_sizes(), vec![2]);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropping_handles_ends_the_stream() {
        let sender = Arc::new(RecordingSender::default());
        let (handle, task) = spawn_service(10, &sender);

        let other = handle.clone();
        handle.accept(json!({ "id": 1 })).await.unwrap();
        other.accept(json!({ "id": 2 })).await.unwrap();
        drop(handle);
        drop(other);

        task.await.unwrap();
        assert_eq!(sender.batch_sizes(), vec![2]);
    }

    #[tokio::test]
    async fn test_accept_after_close_fails() {
        let sender = Arc::new(RecordingSender::default());
        let (handle, task) = spawn_service(10, &sender);

        handle.close().await.unwrap();
        task.await.unwrap();

        let result = handle.accept(json!({ "id": 1 })).await;
        assert!(matches!(result, Err(SinkError::ServiceUnavailable(_))));
        assert!(sender.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_error_reaches_triggering_handle() {
        let sender = Arc::new(RecordingSender::failing_on(&[0]));
        let (handle, task) = spawn_service(2, &sender);

        handle.accept(json!({ "id": 1 })).await.unwrap();
        let result = handle.accept(json!({ "id": 2 })).await;
        assert!(matches!(result, Err(SinkError::Delivery { count: 2, .. })));

        handle.accept(json!({ "id": 3 })).await.unwrap();
        handle.close().await.unwrap();
        task.await.unwrap();
        assert_eq!(sender.batch_sizes(), vec![2, 1]);
    }

    #[tokio::test]
    async fn test_cancellation_drains_and_flushes() {
        let sender = Arc::new(RecordingSender::default());
        let sink = BatchingSink::with_sender(settings(10), Arc::clone(&sender));
        let (service, handle) = SinkService::new(sink);
        let cancel_token = service.cancel_token();

        // Queue events before the service starts so the drain path sees them
        let pending: Vec<_> = (0..3)
            .map(|id| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.accept(json!({ "id": id })).await })
            })
            .collect();
        tokio::task::yield_now().await;
        cancel_token.cancel();

        service.run().await;
        for ack in pending {
            assert!(ack.await.unwrap().is_ok());
        }
        assert_eq!(sender.batch_sizes(), vec![3]);
    }
}
