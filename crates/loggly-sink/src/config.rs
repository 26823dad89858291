// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sink configuration.
//!
//! [`Config`] is the raw surface, deserializable from JSON (camelCase keys,
//! with the `token`/`subdomain`/`name`/`hostname` aliases) or read from
//! `LOGGLY_*` environment variables. It is resolved exactly once into
//! [`Settings`], which the sink and the client keep for their lifetime.
//!
//! ## Edge Cases and Behaviors
//!
//! - **Wrong-typed token or account id**: ignored with an error log, which then
//!   fails resolution the same way a missing value does
//! - **Whitespace**: string values are trimmed, empty after trimming means unset
//! - **Threshold**: non-numeric or negative values fall back to the default (20)
//! - **Tags**: non-array values are ignored, a comma separated string is split
//! - **Flush timeout = 0**: falls back to the default (5 seconds)
//! - **URL without protocol**: `https://` is prepended

use reqwest::Url;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::error;

use crate::constants::{DEFAULT_FLUSH_TIMEOUT_SECS, DEFAULT_INPUT_URL, DEFAULT_THRESHOLD};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::module_name_repetitions)]
pub enum ConfigError {
    #[error("Loggly API token required")]
    MissingApiToken,
    #[error("Loggly account identifier (subdomain) required")]
    MissingAccountId,
    #[error("invalid Loggly URL {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    #[serde(alias = "token", deserialize_with = "deserialize_optional_string")]
    pub api_token: Option<String>,
    #[serde(alias = "subdomain", deserialize_with = "deserialize_optional_string")]
    pub account_id: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub threshold: Option<u64>,
    #[serde(deserialize_with = "deserialize_tags")]
    pub tags: Vec<String>,
    #[serde(alias = "name", deserialize_with = "deserialize_optional_string")]
    pub source_name: Option<String>,
    #[serde(alias = "hostname", deserialize_with = "deserialize_optional_string")]
    pub source_host: Option<String>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub url: Option<String>,
    // Seconds before a bulk POST is abandoned
    #[serde(deserialize_with = "deserialize_optional_u64")]
    pub flush_timeout: Option<u64>,
    #[serde(deserialize_with = "deserialize_optional_string")]
    pub proxy_https: Option<String>,
}

impl Config {
    /// Builds a configuration from the `LOGGLY_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from any key lookup, using the environment
    /// variable names as keys.
    ///
    /// `HTTPS_PROXY` is used when `LOGGLY_PROXY_HTTPS` is not set.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let number = |key: &str| {
            var(key).and_then(|value| match value.parse::<u64>() {
                Ok(n) => Some(n),
                Err(e) => {
                    error!("Failed to parse {key}={value}: {e}, ignoring");
                    None
                }
            })
        };

        Config {
            api_token: var("LOGGLY_TOKEN"),
            account_id: var("LOGGLY_SUBDOMAIN"),
            threshold: number("LOGGLY_THRESHOLD"),
            tags: var("LOGGLY_TAGS")
                .map(|tags| split_comma_separated(&tags))
                .unwrap_or_default(),
            source_name: var("LOGGLY_NAME"),
            source_host: var("LOGGLY_HOSTNAME"),
            url: var("LOGGLY_URL"),
            flush_timeout: number("LOGGLY_FLUSH_TIMEOUT"),
            proxy_https: var("LOGGLY_PROXY_HTTPS").or_else(|| var("HTTPS_PROXY")),
        }
    }

    /// Validates the configuration and fills in defaults.
    ///
    /// Fails when the API token or the account id is missing, empty, or was
    /// not a string, and when the input URL cannot be parsed.
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let api_token = non_empty(self.api_token).ok_or(ConfigError::MissingApiToken)?;
        let account_id = non_empty(self.account_id).ok_or(ConfigError::MissingAccountId)?;

        let threshold = self.threshold.map_or(DEFAULT_THRESHOLD, |threshold| {
            usize::try_from(threshold).unwrap_or(usize::MAX)
        });

        let raw_url = non_empty(self.url).unwrap_or_else(|| DEFAULT_INPUT_URL.to_string());
        let input_url = parse_input_url(&raw_url)?;

        let flush_timeout = match self.flush_timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => Duration::from_secs(DEFAULT_FLUSH_TIMEOUT_SECS),
        };

        Ok(Settings {
            api_token,
            account_id,
            threshold,
            tags: self
                .tags
                .into_iter()
                .map(|tag| tag.trim().to_string())
                .filter(|tag| !tag.is_empty())
                .collect(),
            source_name: non_empty(self.source_name),
            source_host: non_empty(self.source_host),
            input_url,
            flush_timeout,
            proxy_https: non_empty(self.proxy_https),
        })
    }
}

/// Resolved, immutable sink settings.
#[derive(Clone, PartialEq)]
pub struct Settings {
    pub api_token: String,
    pub account_id: String,
    pub threshold: usize,
    pub tags: Vec<String>,
    pub source_name: Option<String>,
    pub source_host: Option<String>,
    pub input_url: Url,
    pub flush_timeout: Duration,
    pub proxy_https: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("threshold", &self.threshold)
            .field("tags", &self.tags)
            .field("source_name", &self.source_name)
            .field("source_host", &self.source_host)
            .field("input_url", &self.input_url.as_str())
            .field("flush_timeout", &self.flush_timeout)
            .field("proxy_https", &self.proxy_https)
            .finish()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_input_url(raw: &str) -> Result<Url, ConfigError> {
    let normalized = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };
    let url = Url::parse(&normalized).map_err(|e| ConfigError::InvalidUrl(format!("{raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidUrl(format!("{raw}: not a base URL")));
    }
    Ok(url)
}

fn split_comma_separated(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(Some(s)),
        Value::Null => Ok(None),
        other => {
            error!(
                "Failed to parse value, expected a string, got: {}, ignoring",
                other
            );
            Ok(None)
        }
    }
}

pub fn deserialize_optional_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Number(n) => match n.as_u64() {
            Some(n) => Ok(Some(n)),
            None => {
                error!("Failed to parse value, expected a non-negative integer, got: {n}, ignoring");
                Ok(None)
            }
        },
        Value::String(s) => match s.trim().parse::<u64>() {
            Ok(n) => Ok(Some(n)),
            Err(e) => {
                error!("Failed to parse value {s}: {e}, ignoring");
                Ok(None)
            }
        },
        Value::Null => Ok(None),
        other => {
            error!(
                "Failed to parse value, expected a non-negative integer, got: {}, ignoring",
                other
            );
            Ok(None)
        }
    }
}

pub fn deserialize_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Array(values) => Ok(values
            .into_iter()
            .filter_map(|value| match value {
                Value::String(tag) => Some(tag),
                other => {
                    error!("Failed to parse tag, expected a string, got: {other}, ignoring");
                    None
                }
            })
            .collect()),
        Value::String(tags) => Ok(split_comma_separated(&tags)),
        Value::Null => Ok(Vec::new()),
        other => {
            error!(
                "Failed to parse tags, expected an array of strings, got: {}, ignoring",
                other
            );
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn parse(value: Value) -> Config {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_token_fails() {
        let err = parse(json!({ "accountId": "SUBDOMAIN" })).resolve().unwrap_err();
        assert_eq!(err, ConfigError::MissingApiToken);
        assert!(err.to_string().contains("token"));
    }

    #[test]
    fn test_missing_account_id_fails() {
        let err = parse(json!({ "apiToken": "TOKEN" })).resolve().unwrap_err();
        assert_eq!(err, ConfigError::MissingAccountId);
        assert!(err.to_string().contains("account identifier"));
    }

    #[test]
    fn test_wrong_typed_credentials_fail() {
        let err = parse(json!({ "apiToken": 1234, "accountId": "SUBDOMAIN" }))
            .resolve()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiToken);

        let err = parse(json!({ "apiToken": "TOKEN", "accountId": ["SUBDOMAIN"] }))
            .resolve()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingAccountId);
    }

    #[test]
    fn test_empty_token_fails() {
        let err = parse(json!({ "apiToken": "  ", "accountId": "SUBDOMAIN" }))
            .resolve()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingApiToken);
    }

    #[test]
    fn test_defaults() {
        let settings = parse(json!({ "apiToken": "TOKEN", "accountId": "SUBDOMAIN" }))
            .resolve()
            .unwrap();

        assert_eq!(settings.api_token, "TOKEN");
        assert_eq!(settings.account_id, "SUBDOMAIN");
        assert_eq!(settings.threshold, 20);
        assert!(settings.tags.is_empty());
        assert_eq!(settings.source_name, None);
        assert_eq!(settings.source_host, None);
        assert_eq!(settings.input_url.as_str(), "https://logs-01.loggly.com/");
        assert_eq!(settings.flush_timeout, Duration::from_secs(5));
        assert_eq!(settings.proxy_https, None);
    }

    #[test]
    fn test_legacy_aliases() {
        let settings = parse(json!({
            "token": "TOKEN",
            "subdomain": "SUBDOMAIN",
            "threshold": 0,
            "tags": ["api", "prod"],
            "name": "test",
            "hostname": "loggly"
        }))
        .resolve()
        .unwrap();

        assert_eq!(settings.threshold, 0);
        assert_eq!(settings.tags, vec!["api", "prod"]);
        assert_eq!(settings.source_name.as_deref(), Some("test"));
        assert_eq!(settings.source_host.as_deref(), Some("loggly"));
    }

    #[test]
    fn test_tags_that_are_not_an_array_are_ignored() {
        let config = parse(json!({ "tags": { "api": true } }));
        assert!(config.tags.is_empty());

        let config = parse(json!({ "tags": ["api", 3, "prod"] }));
        assert_eq!(config.tags, vec!["api", "prod"]);

        let config = parse(json!({ "tags": "api, prod,," }));
        assert_eq!(config.tags, vec!["api", "prod"]);
    }

    #[test]
    fn test_invalid_threshold_falls_back_to_default() {
        let settings = parse(json!({ "apiToken": "T", "accountId": "A", "threshold": -3 }))
            .resolve()
            .unwrap();
        assert_eq!(settings.threshold, 20);

        let settings = parse(json!({ "apiToken": "T", "accountId": "A", "threshold": "7" }))
            .resolve()
            .unwrap();
        assert_eq!(settings.threshold, 7);
    }

    #[test]
    fn test_zero_flush_timeout_uses_default() {
        let settings = parse(json!({ "apiToken": "T", "accountId": "A", "flushTimeout": 0 }))
            .resolve()
            .unwrap();
        assert_eq!(settings.flush_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_url_without_protocol_gets_https() {
        let settings = parse(json!({
            "apiToken": "T",
            "accountId": "A",
            "url": "logs.example.com:8443"
        }))
        .resolve()
        .unwrap();
        assert_eq!(settings.input_url.as_str(), "https://logs.example.com:8443/");
    }

    #[test]
    fn test_invalid_url_fails() {
        let err = parse(json!({ "apiToken": "T", "accountId": "A", "url": "https://" }))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOGGLY_TOKEN", " TOKEN "),
            ("LOGGLY_SUBDOMAIN", "SUBDOMAIN"),
            ("LOGGLY_THRESHOLD", "5"),
            ("LOGGLY_TAGS", "api,prod"),
            ("LOGGLY_NAME", "test"),
            ("LOGGLY_HOSTNAME", ""),
            ("LOGGLY_FLUSH_TIMEOUT", "ten"),
            ("HTTPS_PROXY", "http://proxy:3128"),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(ToString::to_string));

        assert_eq!(config.api_token.as_deref(), Some("TOKEN"));
        assert_eq!(config.account_id.as_deref(), Some("SUBDOMAIN"));
        assert_eq!(config.threshold, Some(5));
        assert_eq!(config.tags, vec!["api", "prod"]);
        assert_eq!(config.source_name.as_deref(), Some("test"));
        assert_eq!(config.source_host, None);
        assert_eq!(config.flush_timeout, None);
        assert_eq!(config.proxy_https.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_loggly_proxy_takes_precedence() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOGGLY_PROXY_HTTPS", "http://loggly-proxy:3128"),
            ("HTTPS_PROXY", "http://proxy:3128"),
        ]);
        let config = Config::from_lookup(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.proxy_https.as_deref(), Some("http://loggly-proxy:3128"));
    }

    #[test]
    fn test_settings_debug_redacts_token() {
        let settings = parse(json!({ "apiToken": "secret-token", "accountId": "A" }))
            .resolve()
            .unwrap();
        let debug = format!("{settings:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
