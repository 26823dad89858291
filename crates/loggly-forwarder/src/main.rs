// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use serde_json::Value;
use std::{env, process::ExitCode};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader, Split};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use loggly_sink::{BatchingSink, Config, SinkHandle, SinkService};

fn main() -> ExitCode {
    let log_level = env::var("LOGGLY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,{}", log_level);

    let filter = match EnvFilter::try_new(env_filter) {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!("could not parse log level in configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set up tracing subscriber: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(forward());
    // A pending blocking read on stdin must not hold the process open after
    // an interrupt.
    runtime.shutdown_background();
    code
}

async fn forward() -> ExitCode {
    let sink = match BatchingSink::new(Config::from_env()) {
        Ok(sink) => sink,
        Err(e) => {
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Forwarding stdin to Loggly account {} (threshold {})",
        sink.settings().account_id,
        sink.settings().threshold
    );

    let (service, handle) = SinkService::new(sink);
    let cancel_token = service.cancel_token();
    let service_task = tokio::spawn(service.run());

    tokio::select! {
        forwarded = forward_input(BufReader::new(io::stdin()), &handle) => {
            info!("Reached end of input after {forwarded} events");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for shutdown signal: {e}");
            }
            info!("Shutdown requested, flushing remaining events");
            cancel_token.cancel();
        }
    }

    if let Err(e) = handle.close().await {
        debug!("Sink already closed: {e}");
    }
    drop(handle);

    if let Err(e) = service_task.await {
        error!("Sink service task failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

/// Feeds input to the sink one line at a time, waiting for each
/// acknowledgement. Returns the number of events read.
async fn forward_input<R>(reader: R, handle: &SinkHandle) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut forwarded = 0;

    loop {
        let event = match next_event(&mut lines).await {
            Ok(Some(event)) => event,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read input: {e}");
                break;
            }
        };
        forwarded += 1;

        if let Err(e) = handle.accept(event).await {
            warn!("Failed to forward events: {e}");
        }
    }

    forwarded
}

/// Returns the next event, skipping blank lines and lines that are not
/// valid UTF-8. `None` marks the end of input.
async fn next_event<R>(lines: &mut Split<R>) -> io::Result<Option<Value>>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(line) = lines.next_segment().await? {
        match std::str::from_utf8(&line) {
            Ok(line) => {
                if let Some(event) = parse_event(line) {
                    return Ok(Some(event));
                }
            }
            Err(e) => warn!("Skipping input line that is not valid UTF-8: {e}"),
        }
    }
    Ok(None)
}

/// Parses one input line. Lines that are not JSON are shipped as a JSON
/// string; blank lines are skipped.
fn parse_event(line: &str) -> Option<Value> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string())))
}
