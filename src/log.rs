//! Structured request logging.
//!
//! One [`RequestLog`] is produced per handled request and handed to a
//! [`LogFn`] sink. The serialized field set is the log stream's wire format:
//! renaming or removing a field is a breaking change for log consumers.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use hyper::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

/// The fixed-shape structured summary of one request's lifecycle.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    /// Wall-clock start of the request.
    #[serde(rename = "started")]
    pub started: DateTime<Utc>,
    /// Time spent servicing the request, in microseconds.
    #[serde(rename = "duration_us")]
    pub duration_us: u64,
    #[serde(rename = "method")]
    pub method: String,
    #[serde(rename = "url")]
    pub url: String,
    /// Inbound headers as received.
    #[serde(rename = "request_headers")]
    pub request_headers: BTreeMap<String, Vec<String>>,
    /// Outgoing headers as actually written, including adapter-injected
    /// values.
    #[serde(rename = "response_headers")]
    pub response_headers: BTreeMap<String, Vec<String>>,
    /// Final status, post-fallback if serialization failed.
    #[serde(rename = "status")]
    pub status: u16,
    /// The handler-supplied logging payload, or the synthesized diagnostic
    /// record when serialization failed.
    #[serde(rename = "message")]
    pub message: Vec<Value>,
    /// Error encountered while writing the response body, if any.
    #[serde(rename = "write_error")]
    pub write_error: Option<String>,
}

/// Convert a header table into its loggable form, preserving per-key value
/// order.
pub(crate) fn headers_to_map(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}

/// A log sink. Called once per handled request with an opaque structured
/// value; must tolerate concurrent calls and never panic into the request
/// path.
pub type LogFn = Arc<dyn Fn(Value) + Send + Sync>;

/// Build a [`LogFn`] that writes each record as pretty-printed JSON to `w`,
/// one record per line group.
///
/// The writer is locked per record, so a single sink can serve concurrent
/// requests. Failures are reported through `tracing` and swallowed; the
/// request path never sees them.
pub fn json_log<W: Write + Send + 'static>(w: W) -> LogFn {
    let writer = Arc::new(Mutex::new(w));
    Arc::new(move |record: Value| {
        let data = match serde_json::to_vec_pretty(&record) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(%err, "failed to encode log record");
                return;
            }
        };
        let Ok(mut writer) = writer.lock() else {
            tracing::error!("log writer lock poisoned; dropping record");
            return;
        };
        if let Err(err) = writer
            .write_all(&data)
            .and_then(|()| writer.write_all(b"\n"))
        {
            tracing::error!(%err, "failed to write log record");
        }
    })
}
