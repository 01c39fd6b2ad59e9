//! Request parsing on top of [`httparse`].

use bytes::{Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method};

const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum RequestError {
    /// The header block, or a chunked body, has not fully arrived yet.
    #[error("request is incomplete")]
    Incomplete,

    #[error("malformed request: {0}")]
    Parse(#[from] httparse::Error),

    #[error("request line has no {0}")]
    MissingField(&'static str),

    #[error("invalid Content-Length {0:?}")]
    InvalidLength(String),

    #[error("malformed chunked body")]
    InvalidChunk,

    #[error("unsupported Transfer-Encoding {0:?}")]
    UnsupportedEncoding(String),

    #[error("request body truncated: expected {expected} bytes, received {received}")]
    IncompleteBody { expected: usize, received: usize },
}

/// A parsed request.
///
/// ```
/// use thunder::http::request::Request;
///
/// let raw = b"POST /api/search/docs?page=2 HTTP/1.1\r\nContent-Length: 11\r\n\r\n{\"q\":\"foo\"}";
/// let (request, message_len) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/api/search/docs");
/// assert_eq!(request.uri(), "/api/search/docs?page=2");
/// assert_eq!(request.query(), Some("page=2"));
/// assert_eq!(request.body().as_ref(), br#"{"q":"foo"}"#);
/// assert_eq!(message_len, raw.len());
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    /// Request target as sent: path plus `?query`.
    target: String,
    /// Length of the path prefix of `target`.
    path_len: usize,
    /// HTTP minor version.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Parses one request from the front of `buf`.
    ///
    /// Returns the request and the length of the whole message on the wire,
    /// head plus framed body. Anything in `buf` past that length belongs to
    /// the next request.
    ///
    /// The body is framed by `Transfer-Encoding: chunked` (decoded here), or
    /// else by `Content-Length`, or else is empty. A `Content-Length` body
    /// may hold fewer bytes than declared when `buf` ends early; the message
    /// length still counts the declared size and
    /// [`read_body`](Self::read_body) reports the shortfall.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] until the header block (and, for a
    /// chunked body, the terminating chunk) is in `buf`. The other variants
    /// describe a malformed request.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut head = httparse::Request::new(&mut slots);
        let httparse::Status::Complete(body_offset) = head.parse(buf)? else {
            return Err(RequestError::Incomplete);
        };

        let Ok(method) = head
            .method
            .ok_or(RequestError::MissingField("method"))?
            .parse::<Method>();
        let target = head.path.ok_or(RequestError::MissingField("target"))?;
        let version = head.version.ok_or(RequestError::MissingField("version"))?;

        let mut headers = Headers::with_capacity(head.headers.len());
        for field in head.headers.iter() {
            // Non-UTF-8 values are dropped rather than failing the request.
            if let Ok(value) = std::str::from_utf8(field.value) {
                headers.insert(field.name, value);
            }
        }

        let rest = &buf[body_offset..];
        let (body, body_len) = match headers.get("transfer-encoding") {
            Some(coding) if is_chunked(coding) => decode_chunked(rest)?,
            Some(coding) => return Err(RequestError::UnsupportedEncoding(coding.to_owned())),
            None => {
                let declared = match headers.get("content-length") {
                    Some(value) => parse_length(value)?,
                    None => 0,
                };
                let received = declared.min(rest.len());
                (Bytes::copy_from_slice(&rest[..received]), declared)
            }
        };

        let request = Self {
            method,
            path_len: target.find('?').unwrap_or(target.len()),
            target: target.to_owned(),
            version,
            headers,
            body,
        };
        Ok((request, body_offset.saturating_add(body_len)))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without the query string.
    pub fn path(&self) -> &str {
        &self.target[..self.path_len]
    }

    /// The request target exactly as received, query string included.
    pub fn uri(&self) -> &str {
        &self.target
    }

    /// Query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.target[self.path_len..].strip_prefix('?')
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Body bytes as received, possibly short; see [`read_body`](Self::read_body).
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// A handle on the complete body. The body stays in place for
    /// downstream readers.
    ///
    /// # Errors
    ///
    /// [`RequestError::IncompleteBody`] when fewer bytes arrived than
    /// `Content-Length` declared.
    pub fn read_body(&self) -> Result<Bytes, RequestError> {
        match self.content_length() {
            Some(expected) if expected > self.body.len() => Err(RequestError::IncompleteBody {
                expected,
                received: self.body.len(),
            }),
            _ => Ok(self.body.clone()),
        }
    }

    /// `Connection` header if present, otherwise the version default
    /// (keep-alive for HTTP/1.1, close for HTTP/1.0).
    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .get("connection")
            .map_or(self.version == 1, |value| value.eq_ignore_ascii_case("keep-alive"))
    }

    /// Declared body size. `None` for a chunked body, whose framing
    /// overrides any `Content-Length`.
    pub fn content_length(&self) -> Option<usize> {
        if self.headers.contains("transfer-encoding") {
            return None;
        }
        parse_length(self.headers.get("content-length")?).ok()
    }
}

fn parse_length(value: &str) -> Result<usize, RequestError> {
    value
        .trim()
        .parse()
        .map_err(|_| RequestError::InvalidLength(value.to_owned()))
}

// `chunked` must be the final coding applied.
fn is_chunked(coding: &str) -> bool {
    coding
        .rsplit(',')
        .next()
        .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
}

/// Decodes a chunked body from the front of `buf`, returning the payload and
/// the number of framing bytes consumed, trailer section included.
fn decode_chunked(buf: &[u8]) -> Result<(Bytes, usize), RequestError> {
    let mut body = BytesMut::new();
    let mut pos = 0;

    loop {
        let (size_len, size) = match httparse::parse_chunk_size(&buf[pos..]) {
            Ok(httparse::Status::Complete(found)) => found,
            Ok(httparse::Status::Partial) => return Err(RequestError::Incomplete),
            Err(httparse::InvalidChunkSize) => return Err(RequestError::InvalidChunk),
        };
        pos += size_len;

        if size == 0 {
            return skip_trailers(buf, pos).map(|end| (body.freeze(), end));
        }

        let size = usize::try_from(size).map_err(|_| RequestError::InvalidChunk)?;
        let data_end = pos.checked_add(size).ok_or(RequestError::InvalidChunk)?;
        let Some(chunk) = buf.get(pos..data_end) else {
            return Err(RequestError::Incomplete);
        };
        match buf.get(data_end..data_end + 2) {
            Some(b"\r\n") => {}
            Some(_) => return Err(RequestError::InvalidChunk),
            None => return Err(RequestError::Incomplete),
        }
        body.extend_from_slice(chunk);
        pos = data_end + 2;
    }
}

// Trailer fields are discarded; the section ends at the first empty line.
fn skip_trailers(buf: &[u8], mut pos: usize) -> Result<usize, RequestError> {
    loop {
        let Some(line_len) = buf[pos..].windows(2).position(|w| w == b"\r\n") else {
            return Err(RequestError::Incomplete);
        };
        pos += line_len + 2;
        if line_len == 0 {
            return Ok(pos);
        }
    }
}
