//! Simplified HTTP response value.

use std::fmt::Write;

use hyper::header::{HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use serde_json::Value;

use crate::serialize::Serializer;

/// A simplified HTTP response: a status, deferred body data, a logging
/// payload destined for the request log, and outgoing headers and cookies.
///
/// Produced once by a handler and consumed once by the pipeline. The `with_`
/// derivations merge rather than replace, so layered code can only add.
pub struct Response {
    pub status: StatusCode,
    /// Deferred body data. Builder helpers never leave this unset.
    pub data: Serializer,
    /// Opaque loggable values, insertion order preserved.
    pub logging: Vec<Value>,
    pub headers: HeaderMap,
    pub cookies: Vec<SetCookie>,
}

impl Response {
    /// Create a response with the given status and body data.
    pub fn new(status: StatusCode, data: Serializer) -> Self {
        Self {
            status,
            data,
            logging: Vec::new(),
            headers: HeaderMap::new(),
            cookies: Vec::new(),
        }
    }

    /// Append the given headers. Values for a repeated key go after the
    /// existing ones; nothing is overwritten.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        for (name, value) in &headers {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    /// Append a single header value.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Append outgoing cookies, preserving order.
    #[must_use]
    pub fn with_cookies(mut self, cookies: impl IntoIterator<Item = SetCookie>) -> Self {
        self.cookies.extend(cookies);
        self
    }

    /// Append entries to the logging payload.
    #[must_use]
    pub fn with_logging(mut self, entries: impl IntoIterator<Item = Value>) -> Self {
        self.logging.extend(entries);
        self
    }
}

/// An outgoing cookie, rendered into a single `Set-Cookie` header value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetCookie {
    pub name: String,
    pub value: String,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub max_age: Option<i64>,
    pub secure: bool,
    pub http_only: bool,
}

impl SetCookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Self::default()
        }
    }

    /// Render the `Set-Cookie` header value.
    pub fn header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(path) = &self.path {
            let _ = write!(out, "; Path={path}");
        }
        if let Some(domain) = &self.domain {
            let _ = write!(out, "; Domain={domain}");
        }
        if let Some(max_age) = self.max_age {
            let _ = write!(out, "; Max-Age={max_age}");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}
