//! ezserve: an easy request/response adapter over hyper.
//!
//! Out of the box it provides structured request logging and a variety of
//! deferred serializers (text, bytes, JSON, templates, raw readers) for
//! rendering data, plus convenience builders for working with requests and
//! responses.
//!
//! Handlers are pure functions from a [`Request`] view to a [`Response`]
//! value; the [`Pipeline`] turns one into a transport-facing entry point
//! that times the request, realizes the deferred body (recovering from
//! serialization failure with a safe 500), and emits exactly one structured
//! log record per request.
//!
//! # Example
//!
//! ```no_run
//! use ezserve::{json_log, ok, serve, Request, Route, Router, Serializer};
//! use hyper::Method;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let log = json_log(std::io::stderr());
//!     let router = Router::register(
//!         &log,
//!         [
//!             Route::new(Method::GET, "/plaintext/{name}", |r: Request| {
//!                 ok(
//!                     Some(Serializer::text(format!("Hello, {}!", r.vars["name"]))),
//!                     vec![],
//!                 )
//!             }),
//!             Route::new(Method::GET, "/json/{name}", |r: Request| {
//!                 ok(
//!                     Some(Serializer::json(json!({ "greeting": r.vars["name"] }))),
//!                     vec![json!("greeted")],
//!                 )
//!             }),
//!         ],
//!     );
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     serve(listener, router).await
//! }
//! ```

pub mod cookies;
pub mod error;
pub mod helpers;
pub mod log;
pub mod metrics;
pub mod pipeline;
pub mod request;
pub mod response;
pub mod router;
pub mod serialize;

pub use cookies::RequestCookie;
pub use error::{handle_error, Error, HttpError, MAX_CAUSE_DEPTH};
pub use helpers::{
    accepted, bad_request, conflict, created, internal_server_error, no_content, not_found, ok,
    see_other, temporary_redirect, unauthorized,
};
pub use log::{json_log, LogFn, RequestLog};
pub use metrics::Monitor;
pub use pipeline::{Handler, Pipeline};
pub use request::{Body, Request};
pub use response::{Response, SetCookie};
pub use router::{serve, Route, Router};
pub use serialize::{ByteProducer, Serializer};
