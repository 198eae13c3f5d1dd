//! Per-route request monitoring.
//!
//! A [`Monitor`] wraps handlers to observe elapsed time and final status
//! without altering the response they return, and renders the observations
//! in Prometheus text exposition format.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use crate::pipeline::Handler;
use crate::request::Request;

/// Counters and latency samples for one route.
#[derive(Default)]
struct RouteStats {
    requests: AtomicU64,
    errors: AtomicU64,
    latency_us_sum: AtomicU64,
}

/// Observes per-route durations and statuses across concurrent requests.
#[derive(Default)]
pub struct Monitor {
    routes: Mutex<BTreeMap<String, Arc<RouteStats>>>,
}

impl Monitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn stats(&self, pattern: &str) -> Arc<RouteStats> {
        let mut routes = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(routes.entry(pattern.to_string()).or_default())
    }

    /// Wrap `handler`, recording one observation per request under
    /// `pattern`. The handler's response passes through unchanged.
    pub fn observe(self: &Arc<Self>, pattern: &str, handler: impl Handler) -> impl Handler {
        let stats = self.stats(pattern);
        move |request: Request| {
            let start = Instant::now();
            let response = handler.handle(request);
            let elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

            stats.requests.fetch_add(1, Ordering::Relaxed);
            if response.status.is_server_error() {
                stats.errors.fetch_add(1, Ordering::Relaxed);
            }
            stats.latency_us_sum.fetch_add(elapsed_us, Ordering::Relaxed);

            response
        }
    }

    /// Render the tracked routes in Prometheus text exposition format.
    pub fn render_prometheus(&self) -> String {
        let routes = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut out = String::new();
        out.push_str("# HELP http_requests_total Requests handled per route.\n");
        out.push_str("# TYPE http_requests_total counter\n");
        for (pattern, stats) in routes.iter() {
            let _ = writeln!(
                out,
                "http_requests_total{{path=\"{pattern}\"}} {}",
                stats.requests.load(Ordering::Relaxed)
            );
        }

        out.push_str("# HELP http_request_errors_total Responses with a 5xx status per route.\n");
        out.push_str("# TYPE http_request_errors_total counter\n");
        for (pattern, stats) in routes.iter() {
            let _ = writeln!(
                out,
                "http_request_errors_total{{path=\"{pattern}\"}} {}",
                stats.errors.load(Ordering::Relaxed)
            );
        }

        out.push_str(
            "# HELP http_request_duration_us_sum Total handler time per route, microseconds.\n",
        );
        out.push_str("# TYPE http_request_duration_us_sum counter\n");
        for (pattern, stats) in routes.iter() {
            let _ = writeln!(
                out,
                "http_request_duration_us_sum{{path=\"{pattern}\"}} {}",
                stats.latency_us_sum.load(Ordering::Relaxed)
            );
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::{internal_server_error, ok};
    use crate::request::Body;
    use crate::serialize::Serializer;
    use hyper::header::HeaderMap;
    use std::collections::HashMap;
    use std::io::Read;

    fn blank_request() -> Request {
        Request::new(HashMap::new(), Body::empty(), HeaderMap::new())
    }

    #[test]
    fn test_observation_preserves_response() {
        let monitor = Monitor::new();
        let wrapped = monitor.observe("/widgets/{id}", |_request: Request| {
            ok(Some(Serializer::text("payload")), vec![])
        });

        let response = wrapped.handle(blank_request());
        assert_eq!(response.status, hyper::StatusCode::OK);
        let mut producer = response.data.invoke().unwrap();
        let mut body = Vec::new();
        producer.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"payload");
    }

    #[test]
    fn test_counts_requests_and_errors() {
        let monitor = Monitor::new();
        let wrapped_ok = monitor.observe("/a", |_request: Request| ok(None, vec![]));
        let wrapped_failing =
            monitor.observe("/a", |_request: Request| internal_server_error(vec![]));

        wrapped_ok.handle(blank_request());
        wrapped_ok.handle(blank_request());
        wrapped_failing.handle(blank_request());

        let rendered = monitor.render_prometheus();
        assert!(rendered.contains("http_requests_total{path=\"/a\"} 3"));
        assert!(rendered.contains("http_request_errors_total{path=\"/a\"} 1"));
    }

    #[test]
    fn test_render_lists_every_route() {
        let monitor = Monitor::new();
        monitor.observe("/a", |_request: Request| ok(None, vec![]));
        monitor.observe("/b", |_request: Request| ok(None, vec![]));

        let rendered = monitor.render_prometheus();
        assert!(rendered.contains("http_requests_total{path=\"/a\"} 0"));
        assert!(rendered.contains("http_requests_total{path=\"/b\"} 0"));
    }
}
