//! Route registration and dispatch.
//!
//! A [`Router`] binds `(method, path pattern)` pairs to pipelines sharing
//! one log sink. Patterns use `{name}` placeholder segments whose captured
//! values become the request's path variables.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Body as HttpBody, Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::Service;
use hyper::{Method, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::log::LogFn;
use crate::pipeline::{Handler, Pipeline};

/// A (method, path pattern, handler) binding, immutable once registered.
pub struct Route {
    pub method: Method,
    pub pattern: String,
    handler: Arc<dyn Handler>,
}

impl Route {
    pub fn new(method: Method, pattern: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            method,
            pattern: pattern.into(),
            handler: Arc::new(handler),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

fn parse_pattern(pattern: &str) -> Vec<Segment> {
    pattern
        .split('/')
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            segment
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .map_or_else(
                    || Segment::Literal(segment.to_string()),
                    |name| Segment::Var(name.to_string()),
                )
        })
        .collect()
}

/// Match `path` against a parsed pattern, capturing placeholder values.
fn match_pattern(segments: &[Segment], path: &str) -> Option<HashMap<String, String>> {
    let parts: Vec<&str> = path.split('/').filter(|part| !part.is_empty()).collect();
    if parts.len() != segments.len() {
        return None;
    }

    let mut vars = HashMap::new();
    for (segment, part) in segments.iter().zip(&parts) {
        match segment {
            Segment::Literal(literal) => {
                if literal != part {
                    return None;
                }
            }
            Segment::Var(name) => {
                vars.insert(name.clone(), (*part).to_string());
            }
        }
    }
    Some(vars)
}

struct RouteEntry {
    method: Method,
    pattern: Vec<Segment>,
    pipeline: Pipeline,
}

/// The route table: append-only during setup, read-only while serving.
/// Cloning shares the table, so one router serves any number of connections.
#[derive(Clone)]
pub struct Router {
    routes: Arc<Vec<RouteEntry>>,
}

impl Router {
    /// Bind each route's handler to a pipeline sharing `log` and build the
    /// table. When two routes claim the same (method, pattern) pair, the
    /// last-registered one wins.
    pub fn register(log: &LogFn, routes: impl IntoIterator<Item = Route>) -> Self {
        let routes = routes
            .into_iter()
            .map(|route| RouteEntry {
                method: route.method,
                pattern: parse_pattern(&route.pattern),
                pipeline: Pipeline::from_shared(route.handler, Arc::clone(log)),
            })
            .collect();
        Self {
            routes: Arc::new(routes),
        }
    }

    /// Dispatch one request to the matching pipeline, or answer a plain 404.
    pub async fn dispatch<B>(&self, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>>
    where
        B: HttpBody + Unpin,
        B::Error: std::fmt::Display,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        // Scan newest-first so late registrations shadow earlier ones.
        for entry in self.routes.iter().rev() {
            if entry.method != method {
                continue;
            }
            if let Some(vars) = match_pattern(&entry.pattern, &path) {
                return entry.pipeline.run(req, vars).await;
            }
        }
        not_found_response()
    }
}

/// Plain 404 for requests matching no route. No handler ran, so no request
/// log record is emitted for these.
fn not_found_response() -> hyper::Response<Full<Bytes>> {
    let mut response = hyper::Response::new(Full::new(Bytes::from_static(b"404 Not Found")));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

impl Service<hyper::Request<Incoming>> for Router {
    type Response = hyper::Response<Full<Bytes>>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: hyper::Request<Incoming>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.dispatch(req).await) })
    }
}

/// Accept connections on `listener` and serve them with `router` until the
/// surrounding task is cancelled or accepting fails.
pub async fn serve(listener: TcpListener, router: Router) -> std::io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let router = router.clone();
        tokio::spawn(async move {
            let io = TokioIo::new(stream);
            if let Err(err) = http1::Builder::new().serve_connection(io, router).await {
                tracing::warn!(%peer_addr, %err, "failed to serve connection");
            }
        });
    }
}
