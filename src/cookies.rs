//! Request cookie parsing.
//!
//! Tolerates what browsers send: multiple `Cookie` header lines,
//! semicolon-delimited pairs, optional double quotes around values. Pairs
//! with a non-token name or out-of-range value bytes are skipped rather than
//! failing the parse.

use hyper::header::{HeaderMap, COOKIE};

/// A single name/value pair parsed out of the `Cookie` request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestCookie {
    pub name: String,
    pub value: String,
}

/// Parse cookies out of the request headers in header-appearance order,
/// optionally keeping only the cookie named `filter`.
pub(crate) fn read_cookies(headers: &HeaderMap, filter: Option<&str>) -> Vec<RequestCookie> {
    let mut found = Vec::new();
    for line in headers.get_all(COOKIE) {
        let Ok(line) = line.to_str() else { continue };
        for part in line.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (name, raw_value) = match part.split_once('=') {
                Some((name, value)) => (name, value),
                None => (part, ""),
            };
            if !is_cookie_name_valid(name) {
                continue;
            }
            if filter.is_some_and(|filter| filter != name) {
                continue;
            }
            let Some(value) = parse_cookie_value(raw_value) else {
                continue;
            };
            found.push(RequestCookie {
                name: name.to_string(),
                value,
            });
        }
    }
    found
}

fn is_cookie_name_valid(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_byte)
}

/// HTTP token grammar: visible ASCII minus separators.
fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(
            b,
            b'!' | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'*'
                | b'+'
                | b'-'
                | b'.'
                | b'^'
                | b'_'
                | b'`'
                | b'|'
                | b'~'
        )
}

/// Strip surrounding double quotes and validate the value bytes.
fn parse_cookie_value(raw: &str) -> Option<String> {
    let raw = if raw.len() > 1 && raw.starts_with('"') && raw.ends_with('"') {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    if raw.bytes().all(is_cookie_value_byte) {
        Some(raw.to_string())
    } else {
        None
    }
}

fn is_cookie_value_byte(b: u8) -> bool {
    (0x20..0x7f).contains(&b) && b != b'"' && b != b';' && b != b'\\'
}
