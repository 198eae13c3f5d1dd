//! Deferred, fallible response-body production.
//!
//! A [`Serializer`] captures its input at construction and does all encoding
//! work when invoked, so a handler can declare a body without paying for it
//! (or failing) until the pipeline realizes the response.

use std::fmt;
use std::io::{Cursor, Read};

use serde::Serialize;

use crate::error::Error;

/// A lazily-produced stream of response bytes.
pub type ByteProducer = Box<dyn Read + Send>;

/// A deferred, possibly-failing operation producing the response body.
///
/// Invocation consumes the value, so a serializer runs at most once and
/// never eagerly. Construction never touches shared state.
pub struct Serializer {
    produce: Box<dyn FnOnce() -> Result<ByteProducer, Error> + Send>,
}

impl Serializer {
    fn from_fn(produce: impl FnOnce() -> Result<ByteProducer, Error> + Send + 'static) -> Self {
        Self {
            produce: Box::new(produce),
        }
    }

    /// Fixed text content. Never fails.
    pub fn text(s: impl Into<String>) -> Self {
        Self::bytes(s.into().into_bytes())
    }

    /// Fixed byte content. Never fails.
    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        let data = b.into();
        Self::from_fn(move || Ok(Box::new(Cursor::new(data)) as ByteProducer))
    }

    /// An empty body. Never fails.
    pub fn empty() -> Self {
        Self::bytes(Vec::new())
    }

    /// Deferred JSON encoding of `value`.
    ///
    /// Construction always succeeds; invocation fails with
    /// [`Error::Encoding`] if `value` cannot be encoded.
    pub fn json<T>(value: T) -> Self
    where
        T: Serialize + Send + 'static,
    {
        Self::from_fn(move || match serde_json::to_vec(&value) {
            Ok(data) => Ok(Box::new(Cursor::new(data)) as ByteProducer),
            Err(err) => Err(Error::Encoding(err)),
        })
    }

    /// Deferred template render.
    ///
    /// Invocation renders the template into a buffer; a mid-render failure
    /// yields [`Error::Template`] and the partial output is discarded.
    pub fn template<T>(template: T) -> Self
    where
        T: askama::Template + Send + 'static,
    {
        Self::from_fn(move || match template.render() {
            Ok(rendered) => Ok(Box::new(Cursor::new(rendered.into_bytes())) as ByteProducer),
            Err(err) => Err(Error::Template(err)),
        })
    }

    /// Wrap an arbitrary byte stream. Invocation is a no-fail passthrough;
    /// the stream is copied to the transport in buffered chunks rather than
    /// read into memory here.
    pub fn reader(source: impl Read + Send + 'static) -> Self {
        Self::from_fn(move || Ok(Box::new(source) as ByteProducer))
    }

    /// Debug-format `value` with `{:#?}`. Never fails; useful for quick
    /// diagnostics endpoints.
    pub fn debug(value: impl fmt::Debug + Send + 'static) -> Self {
        Self::from_fn(move || {
            Ok(Box::new(Cursor::new(format!("{value:#?}").into_bytes())) as ByteProducer)
        })
    }

    /// Materialize the body. Consumes the serializer.
    pub fn invoke(self) -> Result<ByteProducer, Error> {
        (self.produce)()
    }
}

impl fmt::Debug for Serializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Serializer").finish_non_exhaustive()
    }
}
