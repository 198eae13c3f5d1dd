//! Error taxonomy for the request/response pipeline.
//!
//! Keeps transport failures (`Io`) distinguishable from payload decoding
//! failures (`InvalidPayload`) so handlers can answer 400 vs 500, and keeps
//! serialization failures (`Encoding`, `Template`) separate so the pipeline
//! can intercept them at the response boundary.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use hyper::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};

use crate::helpers;
use crate::response::Response;
use crate::serialize::Serializer;

/// Errors surfaced by request accessors and serializer invocation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading the inbound body or writing the outbound body failed.
    #[error("request I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The inbound body could not be decoded into the expected shape.
    #[error("invalid request payload: {0}")]
    InvalidPayload(#[source] Box<dyn StdError + Send + Sync>),

    /// Deferred JSON encoding of response data failed.
    #[error("encoding response data: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Template execution failed while rendering response data.
    #[error("executing response template: {0}")]
    Template(#[source] askama::Error),

    /// The named request cookie is absent. A normal outcome, not an anomaly.
    #[error("cookie {0:?} not found")]
    CookieNotFound(String),
}

/// A serializable error that knows which HTTP status it maps to.
///
/// Place one at the root of an error chain to control the status
/// [`handle_error`] answers with.
#[derive(Debug, Clone, Serialize)]
pub struct HttpError {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status: status.as_u16(),
            message: message.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{}: {cause}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for HttpError {}

/// Upper bound on cause-chain traversal in [`handle_error`]. A malformed
/// cyclic chain terminates here instead of looping forever.
pub const MAX_CAUSE_DEPTH: usize = 16;

/// Convert an error into a [`Response`], appending a diagnostic entry to the
/// logging payload.
///
/// Walks the `source()` chain to its root (at most [`MAX_CAUSE_DEPTH`]
/// links). A root cause that is an [`HttpError`] becomes a JSON response
/// with its status; anything else becomes a generic 500.
pub fn handle_error(
    message: &str,
    err: &(dyn StdError + 'static),
    mut logging: Vec<Value>,
) -> Response {
    logging.push(json!({
        "message": message,
        "error": err.to_string(),
    }));

    let mut cause = err;
    for _ in 0..MAX_CAUSE_DEPTH {
        match cause.source() {
            Some(next) => cause = next,
            None => break,
        }
    }

    if let Some(http_err) = cause.downcast_ref::<HttpError>() {
        let status = StatusCode::from_u16(http_err.status)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return Response::new(status, Serializer::json(http_err.clone())).with_logging(logging);
    }

    helpers::internal_server_error(logging)
}
