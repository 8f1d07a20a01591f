//! Core types and traits for the postern HTTP server.
//!
//! This crate provides the fundamental building blocks:
//!
//! - [`Buffer`] and the [`ByteStream`] peek/consume stream abstraction
//! - [`Method`], [`Headers`], and the staged [`Request`] type
//! - [`StatusCode`], [`Response`], and [`ResponseBody`]
//! - [`HttpError`] for handler aborts and accept rejections
//! - The [`Middleware`] trait and body-stream transformers
//!
//! # Design Principles
//!
//! - Zero-copy where possible: streams expose their unread window rather
//!   than copying into caller buffers
//! - Blocking I/O; all suspension happens inside stream refills and sink
//!   writes
//! - Ownership moves with the data: a body stream has exactly one reader,
//!   and the pipeline hands it off stage by stage

#![forbid(unsafe_code)]

pub mod error;
pub mod middleware;
pub mod request;
pub mod response;
pub mod stream;

pub use error::HttpError;
pub use middleware::{
    transform, DecodeCallback, EncodeCallback, Middleware, NoopMiddleware, StreamTransform,
};
pub use request::{valid_header_name, valid_header_value, Headers, Method, Request};
pub use response::{Response, ResponseBody, StatusCode};
pub use stream::{read_all, read_line, BodyStream, Buffer, ByteStream, SliceStream, MAX_LINE_LEN};
