// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batching sink that ships structured log events to Loggly.
//!
//! Events are accepted one at a time, wrapped into [`report::Report`]s and
//! buffered until the configured threshold is reached. The whole buffer is
//! then handed to a [`sender::BatchSender`] and cleared, whatever the outcome
//! of the delivery. Closing the sink performs one last flush of the leftovers.
//!
//! ```text
//!   producer ──accept──▶ BatchingSink ──threshold / close──▶ BatchSender ──▶ Loggly
//! ```
//!
//! Delivery is at-most-once: a failed batch is reported to the caller whose
//! event triggered the flush and then dropped.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod client;
pub mod config;
pub mod constants;
pub mod report;
pub mod sender;
pub mod service;
pub mod sink;

pub use client::LogglyClient;
pub use config::{Config, ConfigError, Settings};
pub use report::Report;
pub use sender::{BatchSender, SendError};
pub use service::{SinkHandle, SinkService};
pub use sink::{BatchingSink, SinkError};
