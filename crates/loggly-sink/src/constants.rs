// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Number of buffered reports that triggers a flush when none is configured.
pub const DEFAULT_THRESHOLD: usize = 20;

/// Base URL of the Loggly HTTP/S event endpoint.
pub const DEFAULT_INPUT_URL: &str = "https://logs-01.loggly.com";

/// Request timeout, in seconds, for a single bulk POST.
pub const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 5;

/// Capacity of the command channel in front of [`crate::service::SinkService`].
pub const SINK_CHANNEL_CAPACITY: usize = 1000;
