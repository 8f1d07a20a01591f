//! HTTP response types and status codes.

use std::fmt;

use crate::error::HttpError;
use crate::request::Headers;
use crate::stream::ByteStream;

// ============================================================================
// StatusCode
// ============================================================================

/// An HTTP status code.
///
/// Any integer is representable; [`canonical_reason`](StatusCode::canonical_reason)
/// knows the common table and falls back to a generic phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const ACCEPTED: StatusCode = StatusCode(202);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const REQUEST_TIMEOUT: StatusCode = StatusCode(408);
    pub const LENGTH_REQUIRED: StatusCode = StatusCode(411);
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    pub const URI_TOO_LONG: StatusCode = StatusCode(414);
    pub const HEADER_FIELDS_TOO_LARGE: StatusCode = StatusCode(431);
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    pub const NOT_IMPLEMENTED: StatusCode = StatusCode(501);
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);
    pub const HTTP_VERSION_NOT_SUPPORTED: StatusCode = StatusCode(505);

    /// Wrap a raw status code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// The standard reason phrase, or a generic one for unknown codes.
    #[must_use]
    pub fn canonical_reason(self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            411 => "Length Required",
            413 => "Payload Too Large",
            414 => "URI Too Long",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            503 => "Service Unavailable",
            505 => "HTTP Version Not Supported",
            _ => "Unknown Status",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.canonical_reason())
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

// ============================================================================
// ResponseBody
// ============================================================================

/// Response payload: nothing, a finite string, or a byte stream.
///
/// String bodies are framed with `Content-Length`; stream bodies are emitted
/// with chunked transfer encoding.
pub enum ResponseBody {
    /// No payload (`Content-Length: 0`).
    Empty,
    /// A finite string payload.
    Text(String),
    /// A stream emitted with chunked encoding until end-of-stream.
    Stream(Box<dyn ByteStream + Send>),
}

impl ResponseBody {
    /// Wrap a stream for chunked emission.
    #[must_use]
    pub fn stream(s: impl ByteStream + Send + 'static) -> Self {
        Self::Stream(Box::new(s))
    }

    /// The body's byte length, if it is finite.
    #[must_use]
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Empty => Some(0),
            Self::Text(t) => Some(t.len()),
            Self::Stream(_) => None,
        }
    }

    /// Returns true for an empty finite body.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Text(t) => f.debug_tuple("Text").field(t).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<String> for ResponseBody {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for ResponseBody {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

// ============================================================================
// Response
// ============================================================================

/// An HTTP response under construction.
///
/// Framing headers (`Content-Length`, `Transfer-Encoding`, `Connection`) are
/// normalized by the writer and the connection loop; handlers only pick a
/// status, headers, and a body.
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: ResponseBody,
}

impl Response {
    /// An empty response with the given status.
    #[must_use]
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: ResponseBody::Empty,
        }
    }

    /// An empty `200 OK` response.
    #[must_use]
    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    /// Set a header, replacing previous values for the same name.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Set a string body.
    #[must_use]
    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body = ResponseBody::Text(text.into());
        self
    }

    /// Set a streaming body, emitted with chunked encoding.
    #[must_use]
    pub fn body_stream(mut self, stream: impl ByteStream + Send + 'static) -> Self {
        self.body = ResponseBody::Stream(Box::new(stream));
        self
    }

    /// The response status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The response body.
    #[must_use]
    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Decompose into status, headers, and body.
    #[must_use]
    pub fn into_parts(self) -> (StatusCode, Headers, ResponseBody) {
        (self.status, self.headers, self.body)
    }

    /// Build the error response for a failure value: its status, with the
    /// carried message as the body.
    #[must_use]
    pub fn from_error(err: &HttpError) -> Self {
        Self::new(err.status()).body_text(err.message())
    }

    /// Collapse a handler outcome into a response, mapping errors through
    /// [`from_error`](Response::from_error).
    #[must_use]
    pub fn from_result(result: Result<Response, HttpError>) -> Self {
        match result {
            Ok(resp) => resp,
            Err(err) => Self::from_error(&err),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
