//! Byte buffers and the peek/consume input stream abstraction.
//!
//! Everything that carries bytes through the server — the socket, in-memory
//! request bodies, transfer decoders, handler-supplied streaming responses —
//! implements [`ByteStream`]: peek at the unread window without copying,
//! then consume what was used. Wrappers compose by holding either an owned
//! stream or a `&mut` borrow of one, so a body decoder can borrow the
//! connection's socket stream for the duration of a single request.

use std::fmt;
use std::io;
use std::str::Utf8Error;

use memchr::memchr;

/// Maximum accepted length of a single protocol line (request line, header
/// line, chunk-size line).
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Smallest capacity a [`Buffer`] grows to.
const MIN_CAPACITY: usize = 16;

// ============================================================================
// Buffer
// ============================================================================

/// Growable byte accumulator with amortized O(1) append.
///
/// Capacity grows by doubling (with a 16-byte floor) and is retained across
/// [`clear`](Buffer::clear), so a scratch buffer reused across protocol lines
/// settles at the size of the largest line it has seen.
#[derive(Debug, Default, Clone)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    /// Create an empty buffer without allocating.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with at least `cap` bytes of capacity.
    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(cap),
        }
    }

    /// Number of bytes accumulated since the last clear.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if nothing has been pushed since the last clear.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Forget the contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Shorten the contents to `len` bytes. No-op if already shorter.
    pub fn truncate(&mut self, len: usize) {
        self.bytes.truncate(len);
    }

    /// Append a single byte.
    pub fn push(&mut self, byte: u8) {
        self.ensure(1);
        self.bytes.push(byte);
    }

    /// Append a slice of bytes.
    pub fn push_slice(&mut self, src: &[u8]) {
        self.ensure(src.len());
        self.bytes.extend_from_slice(src);
    }

    /// The accumulated bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// The accumulated bytes as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(&self.bytes)
    }

    /// Consume the buffer, yielding its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    fn ensure(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let mut cap = self.bytes.capacity().max(MIN_CAPACITY);
        while cap < needed {
            cap *= 2;
        }
        self.bytes.reserve_exact(cap - self.bytes.len());
    }
}

// ============================================================================
// ByteStream
// ============================================================================

/// A buffered input stream exposing its unread window without copying.
///
/// # Contract
///
/// - [`peek`](ByteStream::peek) returns the current unconsumed window,
///   blocking to refill if it is exhausted. An empty slice means
///   end-of-stream; once end-of-stream has been observed, every later peek
///   returns an empty slice.
/// - [`consume`](ByteStream::consume) advances past `n` bytes of the most
///   recently peeked window. `n` must not exceed that window's length;
///   `consume(0)` is always valid.
/// - [`close`](ByteStream::close) releases underlying resources and is
///   idempotent.
///
/// Bytes are delivered in order and exactly once: the concatenation of all
/// peeked-then-consumed slices equals the underlying byte sequence.
pub trait ByteStream: fmt::Debug {
    /// Current unconsumed window, refilled as needed. Empty at end-of-stream.
    fn peek(&mut self) -> io::Result<&[u8]>;

    /// Advance past `n` bytes of the last peeked window.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the length of the last peeked window.
    fn consume(&mut self, n: usize);

    /// Release underlying resources. Closing twice is a no-op.
    fn close(&mut self);
}

impl<S: ByteStream + ?Sized> ByteStream for &mut S {
    fn peek(&mut self) -> io::Result<&[u8]> {
        (**self).peek()
    }

    fn consume(&mut self, n: usize) {
        (**self).consume(n);
    }

    fn close(&mut self) {
        (**self).close();
    }
}

impl<S: ByteStream + ?Sized> ByteStream for Box<S> {
    fn peek(&mut self) -> io::Result<&[u8]> {
        (**self).peek()
    }

    fn consume(&mut self, n: usize) {
        (**self).consume(n);
    }

    fn close(&mut self) {
        (**self).close();
    }
}

/// A boxed stream handed through the request-body pipeline.
///
/// The lifetime ties the body to the connection stream it borrows; streams
/// built from owned data (such as handler response bodies) are `'static`.
pub type BodyStream<'a> = Box<dyn ByteStream + Send + 'a>;

// ============================================================================
// SliceStream
// ============================================================================

/// A single-shot stream over an owned byte buffer.
///
/// The whole remaining content is exposed in one window; `close` is a no-op.
#[derive(Debug)]
pub struct SliceStream {
    data: Vec<u8>,
    pos: usize,
}

impl SliceStream {
    /// Wrap owned bytes (or anything convertible: `&str`, `String`, `&[u8]`).
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }
}

impl ByteStream for SliceStream {
    fn peek(&mut self) -> io::Result<&[u8]> {
        Ok(&self.data[self.pos..])
    }

    fn consume(&mut self, n: usize) {
        assert!(
            n <= self.data.len() - self.pos,
            "consume past the peeked window"
        );
        self.pos += n;
    }

    fn close(&mut self) {}
}

// ============================================================================
// Derived readers
// ============================================================================

/// Read the next line into `scratch`, stripping the CRLF (or bare LF)
/// terminator.
///
/// `scratch` is cleared first; reusing one buffer across calls avoids
/// reallocation. Lines longer than [`MAX_LINE_LEN`] are rejected with
/// [`io::ErrorKind::InvalidData`]; end-of-stream before a terminator yields
/// [`io::ErrorKind::UnexpectedEof`].
pub fn read_line<S: ByteStream + ?Sized>(stream: &mut S, scratch: &mut Buffer) -> io::Result<()> {
    scratch.clear();
    loop {
        let window = stream.peek()?;
        if window.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "end of stream before line terminator",
            ));
        }
        match memchr(b'\n', window) {
            Some(i) => {
                scratch.push_slice(&window[..i]);
                stream.consume(i + 1);
                if scratch.as_slice().last() == Some(&b'\r') {
                    scratch.truncate(scratch.len() - 1);
                }
                if scratch.len() > MAX_LINE_LEN {
                    return Err(line_too_long());
                }
                return Ok(());
            }
            None => {
                let n = window.len();
                scratch.push_slice(window);
                stream.consume(n);
                if scratch.len() > MAX_LINE_LEN {
                    return Err(line_too_long());
                }
            }
        }
    }
}

fn line_too_long() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, "line exceeds maximum length")
}

/// Append the stream's remaining bytes to `scratch` until end-of-stream.
pub fn read_all<S: ByteStream + ?Sized>(stream: &mut S, scratch: &mut Buffer) -> io::Result<()> {
    loop {
        let window = stream.peek()?;
        if window.is_empty() {
            return Ok(());
        }
        let n = window.len();
        scratch.push_slice(window);
        stream.consume(n);
    }
}

// ============================================================================
// Tests
// ============================================================================
