//! Request body handling: transfer decoding and materialization.
//!
//! The parser leaves the stream positioned at the first body byte. Based on
//! the request headers, [`attach_body`] wraps the connection stream in the
//! right decoder — chunked or length-limited — producing a body stream that
//! reports end-of-stream exactly at the body's end and never over-reads
//! into the next pipelined request head.

use std::fmt;
use std::io;

use memchr::memchr;
use postern_core::{read_line, BodyStream, Buffer, ByteStream, Headers, StatusCode};

use crate::parser::ParseError;

/// Default maximum materialized body size: 1 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Error types for body reading.
#[derive(Debug)]
pub enum BodyError {
    /// Body exceeds the maximum allowed size.
    TooLarge {
        /// Bytes seen (at least) when the limit tripped.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },
    /// Malformed chunked framing (bad size line, missing CRLF).
    Malformed(io::Error),
    /// The stream ended before the declared body did.
    UnexpectedEof,
    /// The body is not valid UTF-8 and cannot become a string.
    InvalidUtf8,
    /// Transport failure while reading the body.
    Io(io::Error),
}

impl BodyError {
    fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::UnexpectedEof,
            io::ErrorKind::InvalidData => Self::Malformed(e),
            _ => Self::Io(e),
        }
    }

    /// The response status this error maps to, if one should be written.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::TooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            Self::Malformed(_) | Self::UnexpectedEof | Self::InvalidUtf8 => {
                Some(StatusCode::BAD_REQUEST)
            }
            Self::Io(_) => None,
        }
    }
}

impl fmt::Display for BodyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => {
                write!(f, "body too large: {size} bytes exceeds limit of {max}")
            }
            Self::Malformed(e) => write!(f, "malformed body framing: {e}"),
            Self::UnexpectedEof => write!(f, "unexpected end of body"),
            Self::InvalidUtf8 => write!(f, "body is not valid UTF-8"),
            Self::Io(e) => write!(f, "i/o error while reading body: {e}"),
        }
    }
}

impl std::error::Error for BodyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Malformed(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

// ============================================================================
// Chunked transfer decoding
// ============================================================================

/// State machine for chunked decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkedState {
    /// Expecting a chunk-size line.
    ChunkSize,
    /// Inside chunk data.
    ChunkData { remaining: usize },
    /// Expecting CRLF after chunk data.
    ChunkDataEnd,
    /// Reading trailers after the final chunk.
    Trailers,
    /// Terminator fully consumed.
    Complete,
}

/// Decodes a chunked transfer coding incrementally.
///
/// Wraps an inner stream; `peek` exposes the current window within a chunk
/// (never crossing a chunk boundary) and `consume` advances wrapper and
/// inner stream together. Size lines accept an optional `;extension`, which
/// is ignored. Trailer headers after the zero chunk are read and discarded,
/// so the terminator is fully consumed by the time end-of-stream is
/// reported.
#[derive(Debug)]
pub struct ChunkedDecoder<S> {
    inner: S,
    state: ChunkedState,
    line: Buffer,
}

impl<S: ByteStream> ChunkedDecoder<S> {
    /// Wrap a stream positioned at the first chunk-size line.
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            state: ChunkedState::ChunkSize,
            line: Buffer::new(),
        }
    }

    /// Returns true once the terminating chunk and trailers are consumed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state == ChunkedState::Complete
    }

    /// Drive the state machine until positioned inside chunk data or done.
    fn advance(&mut self) -> io::Result<()> {
        loop {
            match self.state {
                ChunkedState::ChunkData { .. } | ChunkedState::Complete => return Ok(()),
                ChunkedState::ChunkSize => {
                    read_line(&mut self.inner, &mut self.line)?;
                    let size = parse_chunk_size(self.line.as_slice())?;
                    self.state = if size == 0 {
                        ChunkedState::Trailers
                    } else {
                        ChunkedState::ChunkData { remaining: size }
                    };
                }
                ChunkedState::ChunkDataEnd => {
                    read_line(&mut self.inner, &mut self.line)?;
                    if !self.line.is_empty() {
                        return Err(invalid_chunk("expected CRLF after chunk data"));
                    }
                    self.state = ChunkedState::ChunkSize;
                }
                ChunkedState::Trailers => {
                    read_line(&mut self.inner, &mut self.line)?;
                    if self.line.is_empty() {
                        self.state = ChunkedState::Complete;
                    }
                }
            }
        }
    }
}

impl<S: ByteStream> ByteStream for ChunkedDecoder<S> {
    fn peek(&mut self) -> io::Result<&[u8]> {
        self.advance()?;
        match self.state {
            ChunkedState::Complete => Ok(&[]),
            ChunkedState::ChunkData { remaining } => {
                let window = self.inner.peek()?;
                if window.is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "stream ended inside a chunk",
                    ));
                }
                let n = window.len().min(remaining);
                Ok(&window[..n])
            }
            _ => unreachable!("advance stops at data or completion"),
        }
    }

    fn consume(&mut self, n: usize) {
        match &mut self.state {
            ChunkedState::ChunkData { remaining } => {
                assert!(n <= *remaining, "consume past the peeked window");
                self.inner.consume(n);
                *remaining -= n;
                if *remaining == 0 {
                    self.state = ChunkedState::ChunkDataEnd;
                }
            }
            _ => assert!(n == 0, "consume outside chunk data"),
        }
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

fn invalid_chunk(detail: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, detail)
}

/// Parse a chunk-size line: hex digits with an optional `;extension`.
fn parse_chunk_size(line: &[u8]) -> io::Result<usize> {
    let digits = match memchr(b';', line) {
        Some(semi) => &line[..semi],
        None => line,
    };
    let digits = std::str::from_utf8(digits)
        .map_err(|_| invalid_chunk("invalid chunk size"))?
        .trim();
    if digits.is_empty() {
        return Err(invalid_chunk("empty chunk size"));
    }
    usize::from_str_radix(digits, 16).map_err(|_| invalid_chunk("invalid chunk size"))
}

// ============================================================================
// Length-limited reading
// ============================================================================

/// Exposes exactly `remaining` bytes of an inner stream, then end-of-stream.
///
/// Never reads past the declared length, so the inner stream stays
/// positioned at the next request head. Inner end-of-stream before the
/// declared length is an error.
#[derive(Debug)]
pub struct LengthLimited<S> {
    inner: S,
    remaining: usize,
}

impl<S: ByteStream> LengthLimited<S> {
    /// Expose the next `len` bytes of `inner`.
    #[must_use]
    pub fn new(inner: S, len: usize) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }

    /// Bytes not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.remaining
    }
}

impl<S: ByteStream> ByteStream for LengthLimited<S> {
    fn peek(&mut self) -> io::Result<&[u8]> {
        if self.remaining == 0 {
            return Ok(&[]);
        }
        let window = self.inner.peek()?;
        if window.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended before declared content length",
            ));
        }
        let n = window.len().min(self.remaining);
        Ok(&window[..n])
    }

    fn consume(&mut self, n: usize) {
        assert!(n <= self.remaining, "consume past the peeked window");
        self.inner.consume(n);
        self.remaining -= n;
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

// ============================================================================
// Body attachment and materialization
// ============================================================================

/// Wrap the connection stream in the decoder the request headers call for.
///
/// `Transfer-Encoding: chunked` gets the chunked decoder; `identity` is
/// treated as absent; any other coding is unimplemented. Without a transfer
/// coding, `Content-Length` bounds the body (absent or unparsable means
/// empty).
pub fn attach_body<'a, S>(stream: &'a mut S, headers: &Headers) -> Result<BodyStream<'a>, ParseError>
where
    S: ByteStream + Send,
{
    match headers.get("transfer-encoding") {
        Some(te) if te.trim().eq_ignore_ascii_case("chunked") => {
            Ok(Box::new(ChunkedDecoder::new(stream)))
        }
        Some(te) if te.trim().eq_ignore_ascii_case("identity") || te.trim().is_empty() => {
            Ok(length_limited_body(stream, headers))
        }
        Some(_) => Err(ParseError::UnsupportedTransferEncoding),
        None => Ok(length_limited_body(stream, headers)),
    }
}

fn length_limited_body<'a, S>(stream: &'a mut S, headers: &Headers) -> BodyStream<'a>
where
    S: ByteStream + Send,
{
    let len = headers.get_usize("content-length").unwrap_or(0);
    Box::new(LengthLimited::new(stream, len))
}

/// Read the whole (decoded) body into a string, enforcing `max_size`.
pub fn read_body_full<S: ByteStream + ?Sized>(
    stream: &mut S,
    max_size: usize,
) -> Result<String, BodyError> {
    let mut buf = Buffer::with_capacity(max_size.min(4096));
    loop {
        let window = stream.peek().map_err(BodyError::from_io)?;
        if window.is_empty() {
            break;
        }
        let n = window.len();
        if buf.len() + n > max_size {
            return Err(BodyError::TooLarge {
                size: buf.len() + n,
                max: max_size,
            });
        }
        buf.push_slice(window);
        stream.consume(n);
    }
    String::from_utf8(buf.into_bytes()).map_err(|_| BodyError::InvalidUtf8)
}

/// Consume whatever remains of the body without keeping it.
///
/// Used before reusing a connection when an error path skipped the body.
pub fn drain<S: ByteStream + ?Sized>(stream: &mut S) -> io::Result<()> {
    loop {
        let window = stream.peek()?;
        if window.is_empty() {
            return Ok(());
        }
        let n = window.len();
        stream.consume(n);
    }
}

// ============================================================================
// Tests
// ============================================================================
