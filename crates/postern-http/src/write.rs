//! Response serialization.

use std::io::{self, Write};

use postern_core::{Buffer, ByteStream, Response, ResponseBody};

/// Serialize a response to a sink.
///
/// Framing headers are normalized first: finite bodies get a
/// `Content-Length` equal to their byte length and lose any
/// `Transfer-Encoding`; stream bodies get `Transfer-Encoding: chunked` and
/// lose any `Content-Length`. The status line is always `HTTP/1.1`.
///
/// With `head_only` (HEAD requests) the framing headers are written as
/// usual but no body bytes follow.
///
/// Stream bodies are emitted one chunk per peeked window —
/// `<hex len>\r\n<bytes>\r\n` — and terminated with `0\r\n\r\n` at
/// end-of-stream; the stream is closed afterwards. By the stream contract
/// an empty window *is* end-of-stream, so a zero-size data chunk is never
/// emitted.
pub fn write_response<W: Write>(
    sink: &mut W,
    response: Response,
    head_only: bool,
) -> io::Result<()> {
    let (status, mut headers, body) = response.into_parts();

    match &body {
        ResponseBody::Empty | ResponseBody::Text(_) => {
            let len = body.len().unwrap_or(0);
            headers.set("Content-Length", len.to_string());
            headers.remove("Transfer-Encoding");
        }
        ResponseBody::Stream(_) => {
            headers.set("Transfer-Encoding", "chunked");
            headers.remove("Content-Length");
        }
    }

    let mut head = Buffer::with_capacity(256);
    head.push_slice(b"HTTP/1.1 ");
    head.push_slice(status.as_u16().to_string().as_bytes());
    head.push(b' ');
    head.push_slice(status.canonical_reason().as_bytes());
    head.push_slice(b"\r\n");
    for (name, value) in headers.iter() {
        head.push_slice(name.as_bytes());
        head.push_slice(b": ");
        head.push_slice(value.as_bytes());
        head.push_slice(b"\r\n");
    }
    head.push_slice(b"\r\n");
    sink.write_all(head.as_slice())?;

    if head_only {
        if let ResponseBody::Stream(mut stream) = body {
            stream.close();
        }
        return sink.flush();
    }

    match body {
        ResponseBody::Empty => {}
        ResponseBody::Text(text) => sink.write_all(text.as_bytes())?,
        ResponseBody::Stream(mut stream) => {
            let result = write_chunked(sink, &mut stream);
            stream.close();
            result?;
        }
    }
    sink.flush()
}

fn write_chunked<W: Write>(sink: &mut W, stream: &mut dyn ByteStream) -> io::Result<()> {
    loop {
        let window = stream.peek()?;
        if window.is_empty() {
            break;
        }
        let n = window.len();
        write!(sink, "{n:x}\r\n")?;
        sink.write_all(window)?;
        sink.write_all(b"\r\n")?;
        stream.consume(n);
    }
    sink.write_all(b"0\r\n\r\n")
}

// ============================================================================
// Tests
// ============================================================================
