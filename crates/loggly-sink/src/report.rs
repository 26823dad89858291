// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire-ready records built from raw events.
//!
//! The raw event is embedded verbatim under `msg`; only the `timestamp`,
//! `name` and `hostname` fields are derived.

use serde::Serialize;
use serde_json::Value;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::warn;

use crate::config::Settings;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub msg: Value,
}

impl Report {
    /// Wraps `event`, stamping it with its own `timestamp` field or the
    /// current time.
    #[must_use]
    pub fn new(event: Value, settings: &Settings) -> Self {
        Self::at(event, settings, OffsetDateTime::now_utc())
    }

    /// Same as [`Report::new`] with an explicit ingestion time.
    #[must_use]
    pub fn at(event: Value, settings: &Settings, now: OffsetDateTime) -> Self {
        let timestamp = to_iso_string(resolve_timestamp(event.get("timestamp"), now));
        Report {
            timestamp,
            name: settings.source_name.clone(),
            hostname: settings.source_host.clone(),
            msg: event,
        }
    }
}

fn resolve_timestamp(value: Option<&Value>, now: OffsetDateTime) -> OffsetDateTime {
    match value {
        None => now,
        Some(value) if is_unset(value) => now,
        Some(value) => parse_timestamp(value).unwrap_or_else(|| {
            warn!("LOGGLY | Invalid event timestamp {value}, using ingestion time");
            now
        }),
    }
}

/// `null`, `false`, zero and blank strings carry no timestamp.
fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Accepts epoch milliseconds (number or integer string), RFC 3339 and
/// RFC 2822. The result is always in UTC.
fn parse_timestamp(value: &Value) -> Option<OffsetDateTime> {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .filter(|ms| ms.is_finite())
                    .map(|ms| ms.trunc() as i64)
            })
            .and_then(from_epoch_millis)?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .and_then(from_epoch_millis)
                .or_else(|| OffsetDateTime::parse(s, &Rfc3339).ok())
                .or_else(|| OffsetDateTime::parse(s, &Rfc2822).ok())?
        }
        _ => return None,
    };
    OffsetDateTime::from_unix_timestamp_nanos(parsed.unix_timestamp_nanos()).ok()
}

fn from_epoch_millis(ms: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000).ok()
}

/// Renders a UTC instant as `YYYY-MM-DDTHH:mm:ss.sssZ`, with a signed
/// six-digit year outside 0..=9999.
#[must_use]
pub fn to_iso_string(ts: OffsetDateTime) -> String {
    if (0..=9999).contains(&ts.year()) {
        let iso_millis = format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
        );
        if let Ok(formatted) = ts.format(iso_millis) {
            return formatted;
        }
    }
    format!(
        "{:+07}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second(),
        ts.millisecond()
    )
}
