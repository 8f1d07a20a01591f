//! A minimal blocking HTTP/1.1 server library.
//!
//! postern serves one connection per injected worker (an OS thread by
//! default), parses requests through a zero-copy peek/consume stream
//! abstraction, dispatches them through routing and middleware, and emits
//! responses with either fixed-length string bodies or chunked streaming
//! bodies over sequential keep-alive connections.
//!
//! # Quick Start
//!
//! ```no_run
//! use postern::{Pattern, Response, Route, Server};
//!
//! let server = Server::builder().addr("127.0.0.1").port(8080).build();
//!
//! server.add_route(
//!     Route::new(Pattern::parse("/items/{id:int}").unwrap(), |params, _req| {
//!         let id = params.get_int("id").unwrap();
//!         Ok(Response::ok().body_text(format!("item {id}")))
//!     }),
//! );
//!
//! server.run().unwrap();
//! ```
//!
//! # Crate Structure
//!
//! - [`postern_core`] — streams, requests, responses, middleware traits
//! - [`postern_http`] — wire parsing, transfer decoding, response writing
//! - [`postern_router`] — path patterns with typed holes
//! - this crate — server lifecycle and the per-connection pipeline

#![forbid(unsafe_code)]

mod connection;
mod server;

// Re-export crates
pub use postern_core as core;
pub use postern_http as http;
pub use postern_router as router;

// Re-export commonly used types
pub use postern_core::{
    transform, BodyStream, Buffer, ByteStream, DecodeCallback, EncodeCallback, Headers, HttpError,
    Method, Middleware, NoopMiddleware, Request, Response, ResponseBody, SliceStream, StatusCode,
    StreamTransform,
};
pub use postern_http::{
    read_file_with, BodyError, ParseError, ParseLimits, ReaderStream, DEFAULT_BUF_SIZE,
    DEFAULT_MAX_BODY_SIZE,
};
pub use postern_router::{Pattern, PatternError, Route, RouteParams, Router};
pub use server::{BoxTopHandler, ClockFn, ConfigError, Server, ServerBuilder, SpawnFn, StopHandle};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::{
        HttpError, Method, Middleware, Pattern, Request, Response, ResponseBody, Route,
        RouteParams, Server, SliceStream, StatusCode,
    };
}
