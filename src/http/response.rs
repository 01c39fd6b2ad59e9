//! Response builder and HTTP/1.1 serialization.

use std::fmt::Write as _;

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::{Headers, StatusCode};

/// A response on its way to the client.
///
/// The body is [`Bytes`], so a middleware that wants to keep what the client
/// is about to receive clones the handle rather than the payload.
///
/// ```
/// use thunder::http::{Response, StatusCode};
///
/// let wire = Response::new(StatusCode::Ok)
///     .header("Content-Type", "application/json")
///     .body(r#"{"code":0}"#)
///     .into_bytes();
/// let text = std::str::from_utf8(&wire).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.ends_with("Content-Length: 10\r\n\r\n{\"code\":0}"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// `value` serialized as the body, with `Content-Type: application/json`.
    ///
    /// A value that cannot be serialized turns into a bare `500`.
    pub fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .header("Content-Type", "application/json")
                .body_bytes(body),
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize JSON response");
                Self::new(StatusCode::InternalServerError)
            }
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    /// In-place variant of [`header`](Self::header) for middleware that
    /// decorates a downstream response.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn body(self, body: impl Into<String>) -> Self {
        self.body_bytes(body.into())
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Serializes status line, headers and body.
    ///
    /// `Connection` and `Content-Length` are always written by this method;
    /// values set by handlers for either are replaced. A non-empty body
    /// without a `Content-Type` is labelled `text/plain; charset=utf-8`.
    pub fn into_bytes(mut self) -> BytesMut {
        self.headers.remove("content-length");
        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers.set(
            "Connection",
            if self.keep_alive { "keep-alive" } else { "close" },
        );
        self.headers.insert("Content-Length", self.body.len().to_string());

        let mut head = String::with_capacity(64 + self.headers.len() * 32);
        // Writing into a String cannot fail.
        let _ = write!(head, "HTTP/1.1 {}\r\n{}\r\n", self.status, self.headers);

        let mut buf = BytesMut::with_capacity(head.len() + self.body.len());
        buf.put(head.as_bytes());
        buf.put(self.body);
        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(response: Response) -> String {
        String::from_utf8(response.into_bytes().to_vec()).unwrap()
    }

    #[test]
    fn empty_body_gets_length_but_no_type() {
        let s = wire(Response::new(StatusCode::NoContent));
        assert!(s.starts_with("HTTP/1.1 204 No Content\r\n"));
        assert!(!s.contains("Content-Type"));
        assert!(s.ends_with("Content-Length: 0\r\n\r\n"));
    }

    #[test]
    fn handler_supplied_length_is_replaced() {
        let s = wire(
            Response::new(StatusCode::Ok)
                .header("Content-Length", "999")
                .keep_alive(false)
                .body("hello"),
        );
        assert_eq!(s.matches("Content-Length").count(), 1);
        assert!(s.contains("Content-Length: 5\r\n"));
        assert!(s.contains("Connection: close\r\n"));
    }

    #[test]
    fn json_sets_content_type() {
        let r = Response::json(StatusCode::Ok, &serde_json::json!({"code": 0}));
        assert_eq!(r.headers().get("content-type"), Some("application/json"));
        assert_eq!(r.body_ref().as_ref(), br#"{"code":0}"#);
    }

    #[test]
    fn cloned_body_survives_serialization() {
        let r = Response::new(StatusCode::Ok).body_bytes(Bytes::from_static(b"abc"));
        let copy = r.body_ref().clone();
        assert!(wire(r).ends_with("\r\n\r\nabc"));
        assert_eq!(copy.as_ref(), b"abc");
    }
}
