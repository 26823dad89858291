// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The batching state machine.
//!
//! Reports accumulate in the buffer until it holds `threshold` of them. The
//! `accept` call that fills it flushes the whole buffer and resolves with the
//! delivery outcome, so the producer waits on the flush before its next
//! event. Below the threshold `accept` resolves right away.
//!
//! A flush always leaves the buffer empty. Failed batches are reported to the
//! triggering caller and dropped, never requeued.

use serde_json::Value;
use tracing::{debug, warn};

use crate::client::LogglyClient;
use crate::config::{Config, ConfigError, Settings};
use crate::report::Report;
use crate::sender::{BatchSender, SendError};

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum SinkError {
    #[error("failed to deliver batch of {count} events: {source}")]
    Delivery {
        count: usize,
        #[source]
        source: SendError,
    },
    #[error("sink is closed")]
    Closed,
    #[error("sink service unavailable: {0}")]
    ServiceUnavailable(String),
}

pub struct BatchingSink<S = LogglyClient> {
    settings: Settings,
    buffer: Vec<Report>,
    sender: S,
    closed: bool,
}

impl BatchingSink<LogglyClient> {
    /// Validates `config` and builds a sink delivering to Loggly.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let settings = config.resolve()?;
        let client = LogglyClient::new(&settings)?;
        debug!(
            "LOGGLY | Sink created for {} with threshold {}",
            settings.account_id, settings.threshold
        );
        Ok(Self::with_sender(settings, client))
    }
}

impl<S: BatchSender> BatchingSink<S> {
    #[must_use]
    pub fn with_sender(settings: Settings, sender: S) -> Self {
        BatchingSink {
            settings,
            buffer: Vec::new(),
            sender,
            closed: false,
        }
    }

    /// Buffers one event, flushing when the threshold is reached.
    ///
    /// Resolves once the event is buffered, or once the flush it triggered
    /// completes. Only the call that triggered a failed flush sees the error.
    pub async fn accept(&mut self, event: Value) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }

        self.buffer.push(Report::new(event, &self.settings));
        if self.buffer.len() >= self.settings.threshold {
            return self.flush().await;
        }
        Ok(())
    }

    /// Flushes whatever is left. Failures are logged and dropped, since no
    /// caller is waiting on this flush. Later calls do nothing.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if self.buffer.is_empty() {
            debug!("LOGGLY | Closing sink, nothing left to flush");
            return;
        }
        if let Err(e) = self.flush().await {
            warn!("LOGGLY | Final flush failed, events dropped: {e}");
        }
    }

    /// Number of reports waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        // The buffer is emptied before delivery starts, so a dropped flush
        // cannot resend its batch either.
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        debug!("LOGGLY | Flushing {count} events");

        self.sender
            .send(batch)
            .await
            .map_err(|source| SinkError::Delivery { count, source })
    }
}

impl<S> Drop for BatchingSink<S> {
    fn drop(&mut self) {
        if !self.closed && !self.buffer.is_empty() {
            warn!(
                "LOGGLY | Sink dropped without close, {} events lost",
                self.buffer.len()
            );
        }
    }
}
