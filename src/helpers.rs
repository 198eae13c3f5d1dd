//! Convenience constructors for common response statuses.
//!
//! Each helper is a pure data constructor with no shared state. An absent
//! serializer is replaced with the canned reason-phrase text for the status
//! (e.g. `404 Not Found`), so a [`Response`] never leaves here with unset
//! data.

use hyper::header::{HeaderValue, LOCATION};
use hyper::StatusCode;
use serde_json::Value;

use crate::response::Response;
use crate::serialize::Serializer;

fn with_default(status: StatusCode, data: Option<Serializer>, logging: Vec<Value>) -> Response {
    let data = data.unwrap_or_else(|| Serializer::text(reason_phrase(status)));
    Response::new(status, data).with_logging(logging)
}

fn reason_phrase(status: StatusCode) -> String {
    format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )
}

/// HTTP 200 OK.
pub fn ok(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::OK, data, logging)
}

/// HTTP 201 Created.
pub fn created(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::CREATED, data, logging)
}

/// HTTP 202 Accepted.
pub fn accepted(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::ACCEPTED, data, logging)
}

/// HTTP 204 No Content. Carries an empty body by definition.
pub fn no_content(logging: Vec<Value>) -> Response {
    Response::new(StatusCode::NO_CONTENT, Serializer::empty()).with_logging(logging)
}

/// HTTP 409 Conflict.
pub fn conflict(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::CONFLICT, data, logging)
}

/// HTTP 400 Bad Request.
pub fn bad_request(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::BAD_REQUEST, data, logging)
}

/// HTTP 401 Unauthorized.
pub fn unauthorized(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::UNAUTHORIZED, data, logging)
}

/// HTTP 404 Not Found.
pub fn not_found(data: Option<Serializer>, logging: Vec<Value>) -> Response {
    with_default(StatusCode::NOT_FOUND, data, logging)
}

/// HTTP 500 Internal Server Error with the fixed fallback body.
pub fn internal_server_error(logging: Vec<Value>) -> Response {
    Response::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        Serializer::text("500 Internal Server Error"),
    )
    .with_logging(logging)
}

fn redirect(status: StatusCode, location: &str, logging: Vec<Value>) -> Response {
    let mut response = with_default(status, None, logging);
    match HeaderValue::from_str(location) {
        Ok(value) => {
            response.headers.append(LOCATION, value);
        }
        Err(err) => {
            tracing::warn!(%location, %err, "dropping unencodable Location header");
        }
    }
    response
}

/// HTTP 303 See Other redirect to `location`, carried in the `Location`
/// header. Redirects take no body data; there is no point in custom status
/// text for one.
pub fn see_other(location: &str, logging: Vec<Value>) -> Response {
    redirect(StatusCode::SEE_OTHER, location, logging)
}

/// HTTP 307 Temporary Redirect to `location`, carried in the `Location`
/// header.
pub fn temporary_redirect(location: &str, logging: Vec<Value>) -> Response {
    redirect(StatusCode::TEMPORARY_REDIRECT, location, logging)
}
