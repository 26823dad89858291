// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::report::Report;

/// Delivers one batch of reports.
///
/// The returned future resolving is the completion of the delivery attempt:
/// `Ok(())` on success, the failure reason otherwise. The batch is handed
/// over by value and is never given back, whatever the outcome.
#[async_trait]
pub trait BatchSender: Send + Sync {
    async fn send(&self, batch: Vec<Report>) -> Result<(), SendError>;
}

#[derive(Debug, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum SendError {
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to reach Loggly: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Loggly rejected batch with status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
impl<S> BatchSender for std::sync::Arc<S>
where
    S: BatchSender + ?Sized,
{
    async fn send(&self, batch: Vec<Report>) -> Result<(), SendError> {
        (**self).send(batch).await
    }
}
