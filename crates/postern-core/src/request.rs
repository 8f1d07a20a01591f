//! HTTP request types: method, headers, and the staged request.

use std::fmt;

/// HTTP request methods handled by the server.
///
/// Anything else on the wire is rejected as unimplemented.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Put,
    Post,
    Head,
    Delete,
}

impl Method {
    /// Parse a method token from the request line.
    #[must_use]
    pub fn from_bytes(src: &[u8]) -> Option<Self> {
        match src {
            b"GET" => Some(Self::Get),
            b"PUT" => Some(Self::Put),
            b"POST" => Some(Self::Post),
            b"HEAD" => Some(Self::Head),
            b"DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    /// The wire form of the method.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Head => "HEAD",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Headers
// ============================================================================

/// Returns true if `name` is a non-empty RFC 7230 token.
#[must_use]
pub fn valid_header_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(is_token_byte)
}

/// Returns true if `value` is free of CR and LF.
#[must_use]
pub fn valid_header_value(value: &str) -> bool {
    !value.bytes().any(|b| b == b'\r' || b == b'\n')
}

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

/// An ordered sequence of header (name, value) pairs.
///
/// Name lookup is case-insensitive; values compare exactly. Order is
/// preserved as written, which matters for serialization and for multi-value
/// headers.
#[derive(Debug, Default, Clone)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Create an empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// First value for `name`, compared case-insensitively.
    ///
    /// The query name is trimmed before comparison.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values for `name`, in insertion order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        let name = name.trim();
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if at least one entry matches `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Append an entry, keeping any existing entries for the same name.
    ///
    /// # Panics
    ///
    /// Panics if the name is not a token or the value contains CR/LF.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        assert!(valid_header_name(&name), "invalid header name: {name:?}");
        assert!(valid_header_value(&value), "header value contains CR/LF");
        self.entries.push((name, value));
    }

    /// Replace all entries for `name` (case-insensitive) with a single entry.
    ///
    /// # Panics
    ///
    /// Panics if the name is not a token or the value contains CR/LF.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.append(name, value);
    }

    /// Delete every entry matching `name` case-insensitively.
    pub fn remove(&mut self, name: &str) {
        let name = name.trim();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read a header as an unsigned integer, failing softly.
    ///
    /// Returns `None` when the header is absent or does not parse.
    #[must_use]
    pub fn get_usize(&self, name: &str) -> Option<usize> {
        self.get(name)?.trim().parse().ok()
    }
}

// ============================================================================
// Request
// ============================================================================

/// An HTTP request, parameterized by its body stage.
///
/// The body passes through three concrete types on its way to a handler:
///
/// - `()` — headers only, before any body byte is read (what decode
///   middleware and accept predicates see);
/// - [`BodyStream`](crate::stream::BodyStream) — the decoded byte stream,
///   before it is read;
/// - `String` — the fully materialized body handed to handlers.
///
/// Stage transitions use [`with_body`](Request::with_body) and
/// [`map_body`](Request::map_body), which keep method, target, headers, and
/// the start timestamp intact.
#[derive(Debug)]
pub struct Request<B> {
    method: Method,
    target: String,
    headers: Headers,
    body: B,
    start_s: f64,
}

impl<B> Request<B> {
    /// Assemble a request from parts.
    ///
    /// `target` is the raw request target, query string included.
    /// `start_s` is the clock reading captured when the request line arrived.
    #[must_use]
    pub fn new(
        method: Method,
        target: impl Into<String>,
        headers: Headers,
        body: B,
        start_s: f64,
    ) -> Self {
        Self {
            method,
            target: target.into(),
            headers,
            body,
            start_s,
        }
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// The raw request target, query string included.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The path component, query string stripped.
    #[must_use]
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// The query string after `?`, if any.
    #[must_use]
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// The request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the request headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// The body at its current stage.
    #[must_use]
    pub fn body(&self) -> &B {
        &self.body
    }

    /// Clock reading captured when the request arrived.
    #[must_use]
    pub fn start_s(&self) -> f64 {
        self.start_s
    }

    /// Swap in a body of another stage, yielding the old body.
    pub fn with_body<T>(self, body: T) -> (Request<T>, B) {
        let old = self.body;
        let req = Request {
            method: self.method,
            target: self.target,
            headers: self.headers,
            body,
            start_s: self.start_s,
        };
        (req, old)
    }

    /// Transform the body in place, keeping everything else.
    pub fn map_body<T>(self, f: impl FnOnce(B) -> T) -> Request<T> {
        Request {
            method: self.method,
            target: self.target,
            headers: self.headers,
            body: f(self.body),
            start_s: self.start_s,
        }
    }

    /// Consume the request, yielding the body.
    #[must_use]
    pub fn into_body(self) -> B {
        self.body
    }
}

// ============================================================================
// Tests
// ============================================================================
