// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP delivery of report batches to the Loggly bulk endpoint.
//!
//! A batch is POSTed as a JSON array to `{url}/bulk/{token}/tag/{tags}/`.
//! Tags travel in the URL path: tags sent through the `X-LOGGLY-TAG` header
//! are not rendered for JSON events.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use std::error::Error;
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::config::{ConfigError, Settings};
use crate::report::Report;
use crate::sender::{BatchSender, SendError};

#[derive(Debug, Clone)]
pub struct LogglyClient {
    client: reqwest::Client,
    bulk_url: Url,
    account_id: String,
}

impl LogglyClient {
    /// Builds the client once; it is reused for every batch.
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(LogglyClient {
            client: get_client(settings),
            bulk_url: bulk_url(&settings.input_url, &settings.api_token, &settings.tags)?,
            account_id: settings.account_id.clone(),
        })
    }

    #[must_use]
    pub fn account_id(&self) -> &str {
        &self.account_id
    }
}

#[async_trait]
impl BatchSender for LogglyClient {
    async fn send(&self, batch: Vec<Report>) -> Result<(), SendError> {
        let count = batch.len();
        let body = serde_json::to_vec(&batch)?;

        let time = Instant::now();
        let resp = self
            .client
            .post(self.bulk_url.clone())
            .headers(headers())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "LOGGLY | Failed to send {count} events to {} after {} ms: {e}",
                    self.account_id,
                    time.elapsed().as_millis()
                );
                e
            })?;

        let status = resp.status();
        if status.is_success() {
            debug!(
                "LOGGLY | Delivered {count} events to {} in {} ms",
                self.account_id,
                time.elapsed().as_millis()
            );
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        error!("LOGGLY | {status}: Loggly rejected {count} events: {body}");
        Err(SendError::Status { status, body })
    }
}

fn headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Appends `bulk/{token}[/tag/{tags}]/` to the input URL, keeping any path
/// prefix it already has.
fn bulk_url(input_url: &Url, token: &str, tags: &[String]) -> Result<Url, ConfigError> {
    let mut url = input_url.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ConfigError::InvalidUrl(format!("{input_url}: not a base URL")))?;
        segments.pop_if_empty().extend(["bulk", token]);
        if !tags.is_empty() {
            segments.extend(["tag", tags.join(",").as_str()]);
        }
        segments.push("");
    }
    Ok(url)
}

/// Creates the HTTP client, falling back to a direct connection when the
/// proxy configuration is unusable.
#[must_use]
pub fn get_client(settings: &Settings) -> reqwest::Client {
    match build_client(settings, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "LOGGLY | Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(settings, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "LOGGLY | Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    settings: &Settings,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(settings.flush_timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(proxy) = &settings.proxy_https {
            client = client.proxy(reqwest::Proxy::https(proxy)?);
        }
    }

    Ok(client.build()?)
}
