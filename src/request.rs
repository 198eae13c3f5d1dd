//! Read-only view of one inbound request.

use std::collections::HashMap;
use std::io::{self, Read};

use bytes::Bytes;
use hyper::header::HeaderMap;
use serde::de::DeserializeOwned;

use crate::cookies::{self, RequestCookie};
use crate::error::Error;

/// Single-read request body.
///
/// Draining it a second time yields no bytes. A transport-level read failure
/// is carried inside and surfaces on the first drain, so the handler decides
/// what a broken body means for its response.
pub struct Body(Option<BodySource>);

enum BodySource {
    Reader(Box<dyn Read + Send>),
    Failed(io::Error),
}

impl Body {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self(Some(BodySource::Reader(Box::new(io::Cursor::new(
            data.into(),
        )))))
    }

    pub fn from_reader(reader: impl Read + Send + 'static) -> Self {
        Self(Some(BodySource::Reader(Box::new(reader))))
    }

    /// A body whose first drain reports `err`.
    pub fn failed(err: io::Error) -> Self {
        Self(Some(BodySource::Failed(err)))
    }

    fn drain(&mut self) -> Result<Vec<u8>, Error> {
        match self.0.take() {
            None => Ok(Vec::new()),
            Some(BodySource::Failed(err)) => Err(Error::Io(err)),
            Some(BodySource::Reader(mut reader)) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(buf)
            }
        }
    }
}

/// A simplified view of an inbound HTTP request.
pub struct Request {
    /// Variables captured out of the URL path by the router.
    pub vars: HashMap<String, String>,
    /// The request body. Single-read; see [`Body`].
    pub body: Body,
    /// The inbound HTTP headers.
    pub headers: HeaderMap,
}

impl Request {
    pub fn new(vars: HashMap<String, String>, body: Body, headers: HeaderMap) -> Self {
        Self {
            vars,
            body,
            headers,
        }
    }

    /// Consume the request body and return it whole.
    pub fn bytes(&mut self) -> Result<Vec<u8>, Error> {
        self.body.drain()
    }

    /// Consume the request body and decode it as UTF-8 text.
    pub fn text(&mut self) -> Result<String, Error> {
        String::from_utf8(self.bytes()?).map_err(|err| Error::InvalidPayload(Box::new(err)))
    }

    /// Consume the request body and deserialize it from JSON.
    ///
    /// A body that cannot be decoded is [`Error::InvalidPayload`], distinct
    /// from the [`Error::Io`] a broken transport read produces.
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let data = self.bytes()?;
        serde_json::from_slice(&data).map_err(|err| Error::InvalidPayload(Box::new(err)))
    }

    /// Return the first request cookie named `name`.
    pub fn cookie(&self, name: &str) -> Result<RequestCookie, Error> {
        cookies::read_cookies(&self.headers, Some(name))
            .into_iter()
            .next()
            .ok_or_else(|| Error::CookieNotFound(name.to_string()))
    }

    /// Return every valid request cookie in header-appearance order.
    pub fn cookies(&self) -> Vec<RequestCookie> {
        cookies::read_cookies(&self.headers, None)
    }
}
