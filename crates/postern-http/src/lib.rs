//! HTTP/1.1 wire layer for the postern server.
//!
//! This crate turns raw blocking byte streams into parsed requests and
//! serialized responses:
//!
//! - [`ReaderStream`] buffers any blocking [`Read`](std::io::Read) source
//!   behind the peek/consume interface; [`read_file_with`] scopes a stream
//!   over a file
//! - [`parse_request`] reads a request head and its keep-alive disposition
//! - [`attach_body`] wraps the remaining stream as a chunked-decoded or
//!   length-limited body; [`read_body_full`] materializes it under a cap
//! - [`write_response`] emits a response, framing strings with
//!   `Content-Length` and streams with chunked encoding
//!
//! # Example
//!
//! ```
//! use postern_core::SliceStream;
//! use postern_http::{parse_request, ParseLimits};
//!
//! let mut stream = SliceStream::new("GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
//! let parsed = parse_request(&mut stream, &ParseLimits::default(), 0.0).unwrap();
//! assert_eq!(parsed.request.path(), "/hello");
//! ```

#![forbid(unsafe_code)]

mod body;
mod input;
mod parser;
mod write;

pub use body::{
    attach_body, drain, read_body_full, BodyError, ChunkedDecoder, LengthLimited,
    DEFAULT_MAX_BODY_SIZE,
};
pub use input::{read_file_with, ReaderStream, DEFAULT_BUF_SIZE};
pub use parser::{parse_request, ParseError, ParseLimits, ParsedRequest};
pub use write::write_response;
