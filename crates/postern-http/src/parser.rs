//! Request-line and header parsing.

use std::fmt;
use std::io;

use memchr::memchr;
use postern_core::{
    read_line, valid_header_name, valid_header_value, Buffer, ByteStream, Headers, Method,
    Request, StatusCode,
};

/// Bounds on request head parsing.
///
/// Individual lines are additionally capped at
/// [`MAX_LINE_LEN`](postern_core::MAX_LINE_LEN) by the line reader.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    max_headers: usize,
    max_headers_size: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_headers: 100,
            max_headers_size: 32 * 1024,
        }
    }
}

impl ParseLimits {
    /// Create limits with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of header lines.
    #[must_use]
    pub fn with_max_headers(mut self, max: usize) -> Self {
        self.max_headers = max;
        self
    }

    /// Set the maximum total size of all header lines in bytes.
    #[must_use]
    pub fn with_max_headers_size(mut self, max: usize) -> Self {
        self.max_headers_size = max;
        self
    }

    /// Returns the maximum header count.
    #[must_use]
    pub fn max_headers(&self) -> usize {
        self.max_headers
    }

    /// Returns the maximum total header size.
    #[must_use]
    pub fn max_headers_size(&self) -> usize {
        self.max_headers_size
    }
}

/// Error types for request head parsing.
#[derive(Debug)]
pub enum ParseError {
    /// The connection ended before a complete request head arrived. Not a
    /// protocol violation: the peer closed between keep-alive requests.
    Eof,
    /// The request line is structurally malformed.
    InvalidRequestLine,
    /// The method token is well-formed but not one this server implements.
    UnknownMethod,
    /// The HTTP version is not 1.0 or 1.1.
    UnsupportedVersion,
    /// The request declares a transfer coding other than chunked/identity.
    UnsupportedTransferEncoding,
    /// A header line violates the grammar.
    InvalidHeader {
        /// Description of the violation.
        detail: &'static str,
    },
    /// More header lines than the configured maximum.
    TooManyHeaders {
        /// The configured maximum.
        max: usize,
    },
    /// Header section larger than the configured maximum, or a single line
    /// over the line cap.
    HeadersTooLarge {
        /// The configured maximum in bytes.
        max: usize,
    },
    /// Transport failure while reading the head.
    Io(io::Error),
}

impl ParseError {
    /// The response status this error maps to, if one should be written.
    ///
    /// `None` means close silently (clean end-of-stream or transport error).
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Eof | Self::Io(_) => None,
            Self::UnknownMethod | Self::UnsupportedTransferEncoding => {
                Some(StatusCode::NOT_IMPLEMENTED)
            }
            Self::UnsupportedVersion => Some(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
            Self::TooManyHeaders { .. } | Self::HeadersTooLarge { .. } => {
                Some(StatusCode::HEADER_FIELDS_TOO_LARGE)
            }
            Self::InvalidRequestLine | Self::InvalidHeader { .. } => Some(StatusCode::BAD_REQUEST),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "end of stream before request"),
            Self::InvalidRequestLine => write!(f, "malformed request line"),
            Self::UnknownMethod => write!(f, "unknown request method"),
            Self::UnsupportedVersion => write!(f, "unsupported HTTP version"),
            Self::UnsupportedTransferEncoding => write!(f, "unsupported transfer encoding"),
            Self::InvalidHeader { detail } => write!(f, "invalid header: {detail}"),
            Self::TooManyHeaders { max } => write!(f, "more than {max} headers"),
            Self::HeadersTooLarge { max } => {
                write!(f, "header section exceeds {max} bytes")
            }
            Self::Io(e) => write!(f, "i/o error while parsing: {e}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ParseError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// A parsed request head: the headers-only request plus its keep-alive
/// disposition.
#[derive(Debug)]
pub struct ParsedRequest {
    /// The request with no body attached yet.
    pub request: Request<()>,
    /// Whether the connection should be reused after this exchange, before
    /// anything downstream (errors, handler headers) overrides it.
    pub keep_alive: bool,
}

/// Parse a request head from the stream.
///
/// Consumes the request line and header lines up to and including the empty
/// terminator line; body bytes are left untouched. `now_s` is recorded as
/// the request's start timestamp.
///
/// # Errors
///
/// [`ParseError::Eof`] when the peer closed before sending a request line;
/// protocol violations map to response statuses via [`ParseError::status`].
pub fn parse_request<S: ByteStream + ?Sized>(
    stream: &mut S,
    limits: &ParseLimits,
    now_s: f64,
) -> Result<ParsedRequest, ParseError> {
    // Blocks here while waiting for the next keep-alive request; a clean
    // close between requests surfaces as Eof.
    if stream.peek()?.is_empty() {
        return Err(ParseError::Eof);
    }

    let mut line = Buffer::with_capacity(256);
    read_head_line(stream, &mut line)?;
    let (method, target, http11) = parse_request_line(&line)?;

    let mut headers = Headers::new();
    let mut total = 0usize;
    loop {
        read_head_line(stream, &mut line)?;
        if line.is_empty() {
            break;
        }
        if headers.len() == limits.max_headers {
            return Err(ParseError::TooManyHeaders {
                max: limits.max_headers,
            });
        }
        total += line.len();
        if total > limits.max_headers_size {
            return Err(ParseError::HeadersTooLarge {
                max: limits.max_headers_size,
            });
        }
        parse_header_line(&line, &mut headers)?;
    }

    let keep_alive = keep_alive_disposition(http11, &headers);
    Ok(ParsedRequest {
        request: Request::new(method, target, headers, (), now_s),
        keep_alive,
    })
}

fn read_head_line<S: ByteStream + ?Sized>(
    stream: &mut S,
    line: &mut Buffer,
) -> Result<(), ParseError> {
    read_line(stream, line).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ParseError::Eof,
        io::ErrorKind::InvalidData => ParseError::HeadersTooLarge {
            max: postern_core::MAX_LINE_LEN,
        },
        _ => ParseError::Io(e),
    })
}

fn parse_request_line(line: &Buffer) -> Result<(Method, String, bool), ParseError> {
    let text = line.as_str().map_err(|_| ParseError::InvalidRequestLine)?;

    let mut parts = text.split(' ');
    let (Some(method), Some(target), Some(version), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(ParseError::InvalidRequestLine);
    };
    if target.is_empty() {
        return Err(ParseError::InvalidRequestLine);
    }

    let http11 = match version {
        "HTTP/1.1" => true,
        "HTTP/1.0" => false,
        v if v.starts_with("HTTP/") => return Err(ParseError::UnsupportedVersion),
        _ => return Err(ParseError::InvalidRequestLine),
    };

    let method = Method::from_bytes(method.as_bytes()).ok_or(ParseError::UnknownMethod)?;
    Ok((method, target.to_string(), http11))
}

fn parse_header_line(line: &Buffer, headers: &mut Headers) -> Result<(), ParseError> {
    let bytes = line.as_slice();
    // A continuation line is obsolete folding (RFC 7230 §3.2.4).
    if bytes.starts_with(b" ") || bytes.starts_with(b"\t") {
        return Err(ParseError::InvalidHeader {
            detail: "obsolete line folding",
        });
    }
    let colon = memchr(b':', bytes).ok_or(ParseError::InvalidHeader {
        detail: "missing colon",
    })?;

    let text = line.as_str().map_err(|_| ParseError::InvalidHeader {
        detail: "not valid UTF-8",
    })?;
    let name = &text[..colon];
    let value = text[colon + 1..].trim_matches([' ', '\t']);

    if !valid_header_name(name) {
        return Err(ParseError::InvalidHeader {
            detail: "name is not a token",
        });
    }
    if !valid_header_value(value) {
        return Err(ParseError::InvalidHeader {
            detail: "value contains control bytes",
        });
    }
    headers.append(name, value);
    Ok(())
}

fn keep_alive_disposition(http11: bool, headers: &Headers) -> bool {
    match headers.get("connection") {
        Some(v) if v.trim().eq_ignore_ascii_case("close") => false,
        Some(v) if v.trim().eq_ignore_ascii_case("keep-alive") => true,
        _ => http11,
    }
}

// ============================================================================
// Tests
// ============================================================================
