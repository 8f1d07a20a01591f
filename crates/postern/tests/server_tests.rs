//! End-to-end tests: a real listener, raw sockets, byte-level assertions.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use postern::{
    transform, BodyStream, ByteStream, HttpError, Method, Pattern, Request, Response, Route,
    Server, SliceStream, StatusCode, StopHandle,
};

// ============================================================================
// Harness
// ============================================================================

struct TestServer {
    addr: SocketAddr,
    stop: StopHandle,
    join: JoinHandle<()>,
}

fn start(server: Server) -> TestServer {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(server);
    let stop = server.stop_handle();
    let join = std::thread::spawn(move || server.run_with_listener(listener).unwrap());
    TestServer { addr, stop, join }
}

impl TestServer {
    fn shutdown(self) {
        self.stop.stop();
        // Unblock the accept loop so it observes the flag.
        let _ = TcpStream::connect(self.addr);
        let _ = self.join.join();
    }
}

/// Send raw bytes, half-close, and read everything until the server closes.
fn roundtrip(addr: SocketAddr, raw: &str) -> String {
    let mut socket = TcpStream::connect(addr).unwrap();
    socket.write_all(raw.as_bytes()).unwrap();
    socket.shutdown(Shutdown::Write).unwrap();
    let mut out = String::new();
    socket.read_to_string(&mut out).unwrap();
    out
}

/// Read exactly one framed response off an open connection.
fn read_response(reader: &mut BufReader<&TcpStream>) -> (String, Vec<(String, String)>, String) {
    let mut status_line = String::new();
    reader.read_line(&mut status_line).unwrap();
    let mut headers = Vec::new();
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end_matches("\r\n");
        if line.is_empty() {
            break;
        }
        let (name, value) = line.split_once(": ").unwrap();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse().unwrap();
        }
        headers.push((name.to_string(), value.to_string()));
    }
    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).unwrap();
    (
        status_line.trim_end_matches("\r\n").to_string(),
        headers,
        String::from_utf8(body).unwrap(),
    )
}

fn header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn hello_server() -> Server {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/hello", |_params, _req| {
            Ok(Response::ok().body_text("hi"))
        })
        .unwrap();
    server
}

// ============================================================================
// Core scenarios
// ============================================================================

#[test]
fn get_hello_returns_body_and_keeps_alive() {
    let ts = start(hello_server());
    let out = roundtrip(ts.addr, "GET /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"), "got: {out}");
    assert!(out.contains("Content-Length: 2\r\n"));
    assert!(out.contains("Connection: keep-alive\r\n"));
    assert!(out.ends_with("\r\n\r\nhi"));
    ts.shutdown();
}

#[test]
fn chunked_post_is_decoded_and_echoed() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Post, "/echo", |_params, req| {
            Ok(Response::ok().body_text(req.body().clone()))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(
        ts.addr,
        "POST /echo HTTP/1.1\r\nHost: x\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n",
    );
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Content-Length: 5\r\n"));
    assert!(out.ends_with("\r\n\r\nhello"));
    ts.shutdown();
}

/// A response stream delivering fixed windows, to pin chunk boundaries.
#[derive(Debug)]
struct Chunks(Vec<Vec<u8>>);

impl ByteStream for Chunks {
    fn peek(&mut self) -> std::io::Result<&[u8]> {
        match self.0.first() {
            Some(chunk) => Ok(chunk),
            None => Ok(&[]),
        }
    }

    fn consume(&mut self, n: usize) {
        let chunk = self.0.first_mut().unwrap();
        chunk.drain(..n);
        if chunk.is_empty() {
            self.0.remove(0);
        }
    }

    fn close(&mut self) {}
}

#[test]
fn stream_body_is_emitted_chunked() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/stream", |_params, _req| {
            Ok(Response::ok().body_stream(Chunks(vec![
                b"ab".to_vec(),
                b"c".to_vec(),
                b"def".to_vec(),
            ])))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /stream HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.contains("Transfer-Encoding: chunked\r\n"));
    assert!(!out.contains("Content-Length"));
    assert!(out.ends_with("\r\n\r\n2\r\nab\r\n1\r\nc\r\n3\r\ndef\r\n0\r\n\r\n"));
    ts.shutdown();
}

#[test]
fn unmatched_path_falls_back_to_404() {
    let ts = start(hello_server());
    let out = roundtrip(ts.addr, "GET /missing HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 404 Not Found\r\n"));
    ts.shutdown();
}

#[test]
fn sequential_requests_reuse_the_connection() {
    let clock = Arc::new(AtomicU64::new(0));
    let clock_for_server = Arc::clone(&clock);
    let server = Server::builder()
        .max_keep_alive(5.0)
        .clock(move || clock_for_server.load(Ordering::SeqCst) as f64 / 1000.0)
        .build();
    server
        .add_path_handler(Method::Get, "/hello", |_params, _req| {
            Ok(Response::ok().body_text("hi"))
        })
        .unwrap();
    let ts = start(server);

    let socket = TcpStream::connect(ts.addr).unwrap();
    let mut reader = BufReader::new(&socket);

    (&socket)
        .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (status, headers, body) = read_response(&mut reader);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(header(&headers, "connection"), Some("keep-alive"));
    assert_eq!(body, "hi");

    // Push the injected clock past the keep-alive lifetime; the next
    // exchange still succeeds but closes the connection.
    clock.store(10_000, Ordering::SeqCst);

    (&socket)
        .write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (status, headers, body) = read_response(&mut reader);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(header(&headers, "connection"), Some("close"));
    assert_eq!(body, "hi");

    let mut probe = [0u8; 1];
    assert_eq!(reader.read(&mut probe).unwrap(), 0);
    ts.shutdown();
}

#[test]
fn two_requests_in_one_write_are_handled_in_order() {
    let ts = start(hello_server());
    let out = roundtrip(
        ts.addr,
        "GET /hello HTTP/1.1\r\nHost: x\r\n\r\nGET /hello HTTP/1.1\r\nHost: x\r\n\r\n",
    );
    assert_eq!(out.matches("HTTP/1.1 200 OK").count(), 2);
    ts.shutdown();
}

#[test]
fn malformed_request_line_gets_400_and_close() {
    let ts = start(hello_server());
    let out = roundtrip(ts.addr, "GARBAGE\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 400 Bad Request\r\n"), "got: {out}");
    assert!(out.contains("Connection: close\r\n"));
    ts.shutdown();
}

// ============================================================================
// Error mapping
// ============================================================================

#[test]
fn unknown_method_gets_501() {
    let ts = start(hello_server());
    let out = roundtrip(ts.addr, "FROB /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 501 Not Implemented\r\n"));
    ts.shutdown();
}

#[test]
fn unsupported_version_gets_505() {
    let ts = start(hello_server());
    let out = roundtrip(ts.addr, "GET /hello HTTP/2.0\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 505 HTTP Version Not Supported\r\n"));
    ts.shutdown();
}

#[test]
fn oversized_declared_body_gets_413_without_reading() {
    let server = Server::builder().body_limit(16).build();
    server
        .add_path_handler(Method::Post, "/upload", |_params, _req| {
            Ok(Response::ok())
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(
        ts.addr,
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 64\r\n\r\n",
    );
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    assert!(out.contains("Connection: close\r\n"));
    ts.shutdown();
}

#[test]
fn handler_abort_maps_to_its_status_and_keeps_alive() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/secret", |_params, _req| {
            Err(HttpError::new(StatusCode::FORBIDDEN, "not yours"))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /secret HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 403 Forbidden\r\n"));
    assert!(out.contains("Connection: keep-alive\r\n"));
    assert!(out.ends_with("not yours"));
    ts.shutdown();
}

#[test]
fn handler_panic_maps_to_500_and_close() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/boom", |_params, _req| {
            panic!("handler exploded");
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /boom HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 500 Internal Server Error\r\n"), "got: {out}");
    assert!(out.contains("Connection: close\r\n"));
    ts.shutdown();
}

#[test]
fn bind_failure_is_a_config_error() {
    let taken = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = taken.local_addr().unwrap().port();
    let server = Server::builder().addr("127.0.0.1").port(port).build();
    let err = server.run().unwrap_err();
    assert!(err.to_string().contains("failed to bind"));
}

// ============================================================================
// Routing behavior
// ============================================================================

#[test]
fn later_route_registration_wins() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/x", |_p, _r| {
            Ok(Response::ok().body_text("first"))
        })
        .unwrap();
    server
        .add_path_handler(Method::Get, "/x", |_p, _r| {
            Ok(Response::ok().body_text("second"))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /x HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.ends_with("second"));
    ts.shutdown();
}

#[test]
fn typed_holes_reach_the_handler() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Get, "/items/{id:int}", |params, _req| {
            let id = params.get_int("id").unwrap();
            Ok(Response::ok().body_text(format!("item {id}")))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /items/42?verbose HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.ends_with("item 42"));
    ts.shutdown();
}

#[test]
fn accept_predicate_rejects_with_carried_code() {
    let server = Server::builder().build();
    server.add_route(
        Route::new(Pattern::parse("/upload").unwrap(), |_p, _r| {
            Ok(Response::ok().body_text("stored"))
        })
        .method(Method::Post)
        .accept(|req: &Request<()>| match req.headers().get_usize("content-length") {
            Some(n) if n > 8 => Err(HttpError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                "too big for this route",
            )),
            _ => Ok(()),
        }),
    );
    let ts = start(server);
    let out = roundtrip(
        ts.addr,
        "POST /upload HTTP/1.1\r\nHost: x\r\nContent-Length: 20\r\n\r\n01234567890123456789",
    );
    assert!(out.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
    assert!(out.ends_with("too big for this route"));
    ts.shutdown();
}

#[test]
fn custom_top_handler_replaces_404() {
    let server = Server::builder().build();
    server.set_top_handler(|req: &Request<String>| {
        Ok(Response::ok().body_text(format!("fallback for {}", req.path())))
    });
    let ts = start(server);
    let out = roundtrip(ts.addr, "GET /anything HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.ends_with("fallback for /anything"));
    ts.shutdown();
}

// ============================================================================
// Middleware
// ============================================================================

fn swap_body(_inner: BodyStream<'_>) -> BodyStream<'_> {
    Box::new(SliceStream::new("swapped"))
}

#[test]
fn decode_and_encode_callbacks_run_in_order() {
    let server = Server::builder().build();
    server.add_decode_request_cb(|req: &mut Request<()>| {
        req.headers_mut().set("X-Decoded", "1");
        Some(transform(swap_body))
    });
    server.add_encode_response_cb(|req: &Request<String>, resp: Response| {
        let seen = req.headers().get("x-decoded").unwrap_or("0").to_string();
        resp.header("X-Encoded", seen)
    });
    server
        .add_path_handler(Method::Post, "/echo", |_params, req| {
            Ok(Response::ok().body_text(req.body().clone()))
        })
        .unwrap();
    let ts = start(server);
    // The transformer replaces the inbound body stream wholesale, so ask
    // for close rather than reusing a connection with unread bytes.
    let out = roundtrip(
        ts.addr,
        "POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\nConnection: close\r\n\r\nbody",
    );
    assert!(out.contains("X-Encoded: 1\r\n"));
    assert!(out.ends_with("swapped"));
    ts.shutdown();
}

// ============================================================================
// Methods
// ============================================================================

#[test]
fn head_gets_framing_headers_but_no_body() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Head, "/hello", |_params, _req| {
            Ok(Response::ok().body_text("hi"))
        })
        .unwrap();
    let ts = start(server);
    let out = roundtrip(ts.addr, "HEAD /hello HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(out.contains("Content-Length: 2\r\n"));
    assert!(out.ends_with("\r\n\r\n"));
    ts.shutdown();
}

#[test]
fn content_length_post_is_read_exactly() {
    let server = Server::builder().build();
    server
        .add_path_handler(Method::Post, "/echo", |_params, req| {
            Ok(Response::ok().body_text(req.body().clone()))
        })
        .unwrap();
    let ts = start(server);

    let socket = TcpStream::connect(ts.addr).unwrap();
    let mut reader = BufReader::new(&socket);
    (&socket)
        .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello")
        .unwrap();
    let (status, _headers, body) = read_response(&mut reader);
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "hello");

    // The connection is still usable: the body was read exactly.
    (&socket)
        .write_all(b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 2\r\n\r\nok")
        .unwrap();
    let (_status, _headers, body) = read_response(&mut reader);
    assert_eq!(body, "ok");
    ts.shutdown();
}
