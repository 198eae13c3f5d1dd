//! The request-handling pipeline.
//!
//! Converts a pure [`Handler`] into a transport-facing entry point that owns
//! the full request lifecycle: timing capture, request-view construction,
//! handler invocation, serialization with fallback on failure, header and
//! cookie emission ordering, body write, and exactly-once log emission.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use bytes::Buf;
use chrono::{DateTime, Utc};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body as HttpBody, Bytes};
use hyper::header::{HeaderMap, HeaderValue, CONTENT_LENGTH, SET_COOKIE};
use hyper::{Method, StatusCode, Uri};
use serde_json::{json, Value};

use crate::log::{headers_to_map, LogFn, RequestLog};
use crate::request::{Body, Request};
use crate::response::Response;
use crate::serialize::ByteProducer;

/// Body substituted when response serialization fails.
const FALLBACK_BODY: &[u8] = b"500 Internal Server Error";

/// A request handler: one [`Request`] in, exactly one [`Response`] out.
///
/// Handlers are invoked once per request and never retried. A panic inside a
/// handler is not caught here; it propagates to the host's fault boundary.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

impl<F> Handler for F
where
    F: Fn(Request) -> Response + Send + Sync + 'static,
{
    fn handle(&self, request: Request) -> Response {
        self(request)
    }
}

/// Wraps a handler and a shared log sink into a transport-facing pipeline.
///
/// Holds no per-request state; one instance serves any number of concurrent
/// invocations.
#[derive(Clone)]
pub struct Pipeline {
    handler: Arc<dyn Handler>,
    log: LogFn,
}

impl Pipeline {
    pub fn new(handler: impl Handler, log: LogFn) -> Self {
        Self::from_shared(Arc::new(handler), log)
    }

    pub(crate) fn from_shared(handler: Arc<dyn Handler>, log: LogFn) -> Self {
        Self { handler, log }
    }

    /// Run the pipeline against one inbound request.
    ///
    /// `vars` are the path variables captured by the router. Exactly one log
    /// record is emitted per call, whichever branch executes.
    pub async fn run<B>(
        &self,
        req: hyper::Request<B>,
        vars: HashMap<String, String>,
    ) -> hyper::Response<Full<Bytes>>
    where
        B: HttpBody + Unpin,
        B::Error: std::fmt::Display,
    {
        let started = Utc::now();
        let clock = Instant::now();

        let (parts, body) = req.into_parts();

        // Bound the body read by the declared content length; a missing or
        // unparseable header degrades to a zero-length body, never a request
        // error.
        let mut notes = Vec::new();
        let limit = content_length(&parts.headers, &mut notes);
        let body = read_body(body, limit).await;

        let request = Request::new(vars, body, parts.headers.clone());
        let response = self.handler.handle(request);

        self.finish(
            started,
            clock,
            &parts.method,
            &parts.uri,
            &parts.headers,
            notes,
            response,
        )
    }

    /// Steps after the handler returns: serialize, emit headers, cookies and
    /// status in order, write the body, and log exactly once. Synchronous so
    /// it stays independent of the transport.
    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        started: DateTime<Utc>,
        clock: Instant,
        method: &Method,
        uri: &Uri,
        request_headers: &HeaderMap,
        mut notes: Vec<Value>,
        response: Response,
    ) -> hyper::Response<Full<Bytes>> {
        let Response {
            status,
            data,
            logging,
            headers,
            cookies,
        } = response;

        // Serialization happens exactly once. Failure is recovered here by
        // substituting the fixed fallback; the handler's own diagnostics stay
        // nested inside the synthesized log payload.
        let (status, producer, mut message): (StatusCode, ByteProducer, Vec<Value>) =
            match data.invoke() {
                Ok(producer) => (status, producer, logging),
                Err(err) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Box::new(io::Cursor::new(FALLBACK_BODY.to_vec())),
                    vec![json!({
                        "context": "error serializing response data",
                        "error": err.to_string(),
                        "original_logging": logging,
                    })],
                ),
            };

        // Headers and cookies go on before the status is committed; repeated
        // keys append, never overwrite.
        let mut out = hyper::Response::new(Full::new(Bytes::new()));
        for (name, value) in &headers {
            out.headers_mut().append(name.clone(), value.clone());
        }
        for cookie in &cookies {
            match HeaderValue::from_str(&cookie.header_value()) {
                Ok(value) => {
                    out.headers_mut().append(SET_COOKIE, value);
                }
                Err(err) => {
                    tracing::warn!(name = %cookie.name, %err, "dropping unencodable Set-Cookie header");
                }
            }
        }
        *out.status_mut() = status;

        // Body write: drain the producer into the outgoing body, capturing
        // any read error. The committed status never changes after this
        // point.
        let mut producer = producer;
        let mut body_buf = Vec::new();
        let write_error = io::copy(&mut producer, &mut body_buf).err();
        *out.body_mut() = Full::new(Bytes::from(body_buf));

        if !notes.is_empty() {
            notes.extend(message);
            message = notes;
        }

        let record = RequestLog {
            started,
            duration_us: u64::try_from(clock.elapsed().as_micros()).unwrap_or(u64::MAX),
            method: method.to_string(),
            url: uri.to_string(),
            request_headers: headers_to_map(request_headers),
            response_headers: headers_to_map(out.headers()),
            status: out.status().as_u16(),
            message,
            write_error: write_error.map(|err| err.to_string()),
        };
        self.emit(record);

        out
    }

    fn emit(&self, record: RequestLog) {
        let value = serde_json::to_value(&record).unwrap_or_else(|err| {
            json!({
                "context": "error encoding request log record",
                "error": err.to_string(),
            })
        });
        (self.log)(value);
    }
}

/// Parse the declared `Content-Length`, appending a diagnostic note to the
/// working logging payload when it is missing or unparseable.
fn content_length(headers: &HeaderMap, notes: &mut Vec<Value>) -> u64 {
    let Some(raw) = headers.get(CONTENT_LENGTH) else {
        notes.push(json!({
            "context": "missing content-length header; reading no request body",
        }));
        return 0;
    };
    match raw.to_str().ok().and_then(|s| s.trim().parse::<u64>().ok()) {
        Some(length) => length,
        None => {
            notes.push(json!({
                "context": "unparseable content-length header; reading no request body",
                "value": String::from_utf8_lossy(raw.as_bytes()),
            }));
            0
        }
    }
}

/// Read at most `limit` bytes of the transport body. A mid-stream failure is
/// deferred into the returned [`Body`] so the handler sees it as an ordinary
/// I/O error from its own accessors.
async fn read_body<B>(body: B, limit: u64) -> Body
where
    B: HttpBody + Unpin,
    B::Error: std::fmt::Display,
{
    if limit == 0 {
        return Body::empty();
    }

    let mut body = body;
    let mut buf: Vec<u8> = Vec::new();
    while (buf.len() as u64) < limit {
        match body.frame().await {
            None => break,
            Some(Ok(frame)) => {
                if let Ok(mut data) = frame.into_data() {
                    let chunk = data.copy_to_bytes(data.remaining());
                    buf.extend_from_slice(&chunk);
                }
            }
            Some(Err(err)) => {
                return Body::failed(io::Error::new(io::ErrorKind::Other, err.to_string()));
            }
        }
    }
    buf.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
    Body::from_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{not_found, ok};
    use crate::response::SetCookie;
    use crate::serialize::Serializer;
    use hyper::header::HeaderName;
    use std::io::Read;
    use std::sync::Mutex;

    fn capture_log() -> (LogFn, Arc<Mutex<Vec<Value>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink: LogFn = {
            let records = Arc::clone(&records);
            Arc::new(move |record| records.lock().unwrap().push(record))
        };
        (sink, records)
    }

    fn post(path: &str, body: &str) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(CONTENT_LENGTH, body.len())
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn get(path: &str) -> hyper::Request<Full<Bytes>> {
        hyper::Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_bytes(response: hyper::Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    struct Unencodable;

    impl serde::Serialize for Unencodable {
        fn serialize<S>(&self, _serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            Err(serde::ser::Error::custom("refusing to encode"))
        }
    }

    #[tokio::test]
    async fn test_success_path() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(
            |mut request: Request| {
                let body = request.text().unwrap();
                ok(
                    Some(Serializer::text(format!("got: {body}"))),
                    vec![json!("handled")],
                )
            },
            sink,
        );

        let response = pipeline.run(post("/echo", "hello"), HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await.as_ref(), b"got: hello");

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record["method"], json!("POST"));
        assert_eq!(record["url"], json!("/echo"));
        assert_eq!(record["status"], json!(200));
        assert_eq!(record["message"], json!(["handled"]));
        assert_eq!(record["write_error"], Value::Null);
    }

    #[tokio::test]
    async fn test_serialization_failure_substitutes_fallback() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(
            |_request: Request| {
                ok(
                    Some(Serializer::json(Unencodable)),
                    vec![json!("handler detail"), json!(42)],
                )
            },
            sink,
        );

        let response = pipeline.run(post("/broken", "x"), HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_bytes(response).await.as_ref(),
            b"500 Internal Server Error"
        );

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let message = records[0]["message"].as_array().unwrap();
        assert_eq!(message.len(), 1);
        assert_eq!(message[0]["context"], json!("error serializing response data"));
        assert_eq!(
            message[0]["original_logging"],
            json!(["handler detail", 42])
        );
        assert!(message[0]["error"].as_str().unwrap().contains("encoding"));
    }

    #[tokio::test]
    async fn test_missing_content_length_yields_empty_body_and_note() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(
            |mut request: Request| {
                let body = request.bytes().unwrap();
                assert!(body.is_empty());
                ok(None, vec![json!("ran")])
            },
            sink,
        );

        let response = pipeline.run(get("/nothing"), HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::OK);

        let records = records.lock().unwrap();
        let message = records[0]["message"].as_array().unwrap();
        assert_eq!(message.len(), 2);
        assert!(message[0]["context"]
            .as_str()
            .unwrap()
            .contains("missing content-length"));
        assert_eq!(message[1], json!("ran"));
    }

    #[tokio::test]
    async fn test_unparseable_content_length_notes_value() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(|_request: Request| ok(None, vec![]), sink);

        let req = hyper::Request::builder()
            .method(Method::POST)
            .uri("/widgets")
            .header(CONTENT_LENGTH, "banana")
            .body(Full::new(Bytes::from("ignored")))
            .unwrap();
        pipeline.run(req, HashMap::new()).await;

        let records = records.lock().unwrap();
        let message = records[0]["message"].as_array().unwrap();
        assert!(message[0]["context"]
            .as_str()
            .unwrap()
            .contains("unparseable content-length"));
        assert_eq!(message[0]["value"], json!("banana"));
    }

    #[tokio::test]
    async fn test_body_is_truncated_to_declared_length() {
        let (sink, _records) = capture_log();
        let pipeline = Pipeline::new(
            |mut request: Request| {
                ok(
                    Some(Serializer::bytes(request.bytes().unwrap())),
                    vec![],
                )
            },
            sink,
        );

        let req = hyper::Request::builder()
            .method(Method::POST)
            .uri("/short")
            .header(CONTENT_LENGTH, "4")
            .body(Full::new(Bytes::from("overflowing")))
            .unwrap();
        let response = pipeline.run(req, HashMap::new()).await;
        assert_eq!(body_bytes(response).await.as_ref(), b"over");
    }

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "source dried up"))
        }
    }

    #[tokio::test]
    async fn test_write_error_is_logged_not_fatal() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(
            |_request: Request| ok(Some(Serializer::reader(FailingReader)), vec![]),
            sink,
        );

        let response = pipeline.run(get("/stream"), HashMap::new()).await;
        // Status was committed before the body write failed.
        assert_eq!(response.status(), StatusCode::OK);

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0]["write_error"]
            .as_str()
            .unwrap()
            .contains("source dried up"));
    }

    #[tokio::test]
    async fn test_headers_cookies_and_status_emission() {
        let (sink, records) = capture_log();
        let pipeline = Pipeline::new(
            |_request: Request| {
                let mut cookie = SetCookie::new("session", "abc");
                cookie.http_only = true;
                not_found(None, vec![])
                    .with_header(
                        HeaderName::from_static("x-request-id"),
                        HeaderValue::from_static("7"),
                    )
                    .with_cookies(vec![cookie])
            },
            sink,
        );

        let response = pipeline.run(get("/missing"), HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get("x-request-id").unwrap(), "7");
        assert_eq!(
            response.headers().get(SET_COOKIE).unwrap(),
            "session=abc; HttpOnly"
        );

        // The logged outgoing headers reflect what was actually written,
        // including the Set-Cookie line.
        let records = records.lock().unwrap();
        let response_headers = &records[0]["response_headers"];
        assert_eq!(response_headers["set-cookie"], json!(["session=abc; HttpOnly"]));
        assert_eq!(response_headers["x-request-id"], json!(["7"]));
    }

    #[tokio::test]
    async fn test_vars_reach_handler() {
        let (sink, _records) = capture_log();
        let pipeline = Pipeline::new(
            |request: Request| {
                ok(
                    Some(Serializer::text(format!(
                        "Hello, {}!",
                        request.vars["name"]
                    ))),
                    vec![],
                )
            },
            sink,
        );

        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        let response = pipeline.run(get("/hello/Ada"), vars).await;
        assert_eq!(body_bytes(response).await.as_ref(), b"Hello, Ada!");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_exactly_one_record_per_request() {
        const REQUESTS: usize = 32;

        let (sink, records) = capture_log();
        let fail_some = |request: Request| {
            if request.vars.contains_key("fail") {
                ok(Some(Serializer::json(Unencodable)), vec![json!("original")])
            } else {
                ok(None, vec![])
            }
        };
        let pipeline = Pipeline::new(fail_some, sink);

        let mut tasks = Vec::new();
        for i in 0..REQUESTS {
            let pipeline = pipeline.clone();
            tasks.push(tokio::spawn(async move {
                let mut vars = HashMap::new();
                if i % 2 == 0 {
                    vars.insert("fail".to_string(), String::new());
                }
                pipeline.run(get("/load"), vars).await
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(records.lock().unwrap().len(), REQUESTS);
    }
}
