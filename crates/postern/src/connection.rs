//! The per-connection worker: keep-alive loop and request pipeline.
//!
//! Each accepted socket runs one worker. The worker parses a request head,
//! runs decode callbacks (which may stack body-stream transformers),
//! attaches the decoded body, routes, checks the accept predicate before
//! any body byte is read, materializes the body, invokes the handler with
//! panic isolation, runs encode callbacks, and writes the response. The
//! loop repeats while keep-alive holds and exits by shutting down both
//! socket directions.

use std::io::{self, BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::panic::{catch_unwind, AssertUnwindSafe};

use postern_core::{ByteStream, Method, Response, StatusCode, StreamTransform};
use postern_http::{
    attach_body, parse_request, read_body_full, write_response, ParsedRequest, ReaderStream,
};
use tracing::{debug, error};

use crate::server::Shared;

/// Run one connection to completion and release the socket.
pub(crate) fn handle(shared: &Shared, socket: TcpStream) {
    let peer = socket.peer_addr().ok();
    debug!(?peer, "connection opened");
    serve(shared, &socket);
    // The peer may already be gone; nothing to do about shutdown errors.
    let _ = socket.shutdown(Shutdown::Both);
    debug!(?peer, "connection closed");
}

fn serve(shared: &Shared, socket: &TcpStream) {
    let conn_start = (shared.clock)();
    let mut input = ReaderStream::with_capacity(shared.buf_size, socket);
    let mut output = BufWriter::new(socket);

    loop {
        let parsed = match parse_request(&mut input, &shared.parse_limits, (shared.clock)()) {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Some(status) = e.status() {
                    debug!(error = %e, "rejecting malformed request");
                    let response = Response::new(status).body_text(e.to_string());
                    let _ = write_reply(&mut output, response, false, false);
                } else {
                    debug!(error = %e, "connection ended");
                }
                return;
            }
        };

        let head_only = parsed.request.method() == Method::Head;
        match exchange(shared, &mut input, parsed, conn_start) {
            Exchange::Reply {
                response,
                keep_alive,
            } => {
                if let Err(e) = write_reply(&mut output, response, head_only, keep_alive) {
                    debug!(error = %e, "write failed");
                    return;
                }
                if !keep_alive {
                    return;
                }
            }
            Exchange::Close => return,
        }
    }
}

fn write_reply<W: Write>(
    output: &mut W,
    mut response: Response,
    head_only: bool,
    keep_alive: bool,
) -> io::Result<()> {
    response.headers_mut().set(
        "Connection",
        if keep_alive { "keep-alive" } else { "close" },
    );
    write_response(output, response, head_only)
}

/// Outcome of one request/response cycle.
enum Exchange {
    /// Write this response; reuse the connection if `keep_alive`.
    Reply {
        response: Response,
        keep_alive: bool,
    },
    /// Nothing can be written; close immediately.
    Close,
}

fn exchange<S: ByteStream + Send>(
    shared: &Shared,
    input: &mut S,
    parsed: ParsedRequest,
    conn_start: f64,
) -> Exchange {
    let ParsedRequest {
        mut request,
        mut keep_alive,
    } = parsed;

    // Decode callbacks see the headers-only request and may stack
    // body-stream transformers.
    let mut transforms: Vec<StreamTransform> = Vec::new();
    {
        let middlewares = shared.middlewares.read().unwrap();
        for mw in middlewares.iter() {
            if let Some(t) = mw.decode(&mut request) {
                transforms.push(t);
            }
        }
    }

    // A declared oversized body is rejected without reading any of it.
    if let Some(declared) = request.headers().get_usize("content-length") {
        if declared > shared.body_limit {
            debug!(declared, limit = shared.body_limit, "declared body too large");
            let response = Response::new(StatusCode::PAYLOAD_TOO_LARGE)
                .body_text(format!("declared body of {declared} bytes exceeds limit"));
            return Exchange::Reply {
                response,
                keep_alive: false,
            };
        }
    }

    let mut body = match attach_body(input, request.headers()) {
        Ok(body) => body,
        Err(e) => {
            debug!(error = %e, "cannot attach request body");
            let status = e.status().unwrap_or(StatusCode::BAD_REQUEST);
            return Exchange::Reply {
                response: Response::new(status).body_text(e.to_string()),
                keep_alive: false,
            };
        }
    };
    for t in transforms {
        body = t(body);
    }

    let router = shared.router.read().unwrap();
    let matched = router.lookup(request.method(), request.path());

    // The accept predicate runs before the first body byte is read.
    if let Some((route, _)) = &matched {
        if let Err(err) = route.check_accept(&request) {
            debug!(status = err.status().as_u16(), "accept predicate rejected request");
            return Exchange::Reply {
                response: Response::from_error(&err),
                keep_alive: false,
            };
        }
    }

    let text = match read_body_full(&mut body, shared.body_limit) {
        Ok(text) => text,
        Err(e) => {
            return match e.status() {
                Some(status) => {
                    debug!(error = %e, "request body rejected");
                    Exchange::Reply {
                        response: Response::new(status).body_text(e.to_string()),
                        keep_alive: false,
                    }
                }
                None => {
                    debug!(error = %e, "i/o error while reading request body");
                    Exchange::Close
                }
            };
        }
    };
    drop(body);
    let (request, ()) = request.with_body(text);

    let invoked = catch_unwind(AssertUnwindSafe(|| match &matched {
        Some((route, params)) => route.invoke(params, &request),
        None => {
            let top = shared.top.read().unwrap();
            (*top)(&request)
        }
    }));

    let mut response = match invoked {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            debug!(status = err.status().as_u16(), "handler aborted");
            Response::from_error(&err)
        }
        Err(_) => {
            error!(path = request.path(), "handler panicked");
            keep_alive = false;
            Response::new(StatusCode::INTERNAL_SERVER_ERROR).body_text("Internal Server Error")
        }
    };

    {
        let middlewares = shared.middlewares.read().unwrap();
        for mw in middlewares.iter() {
            response = mw.encode(&request, response);
        }
    }

    // A handler that set Connection: close wins over the parsed disposition.
    if response
        .headers()
        .get("connection")
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("close"))
    {
        keep_alive = false;
    }
    if shared.max_keep_alive_s >= 0.0
        && (shared.clock)() - conn_start > shared.max_keep_alive_s
    {
        debug!("keep-alive lifetime exceeded");
        keep_alive = false;
    }

    Exchange::Reply {
        response,
        keep_alive,
    }
}
