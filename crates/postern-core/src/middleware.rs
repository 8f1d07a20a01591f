//! Middleware: paired hooks around request decoding and response encoding.
//!
//! A middleware sees the request twice. [`decode`](Middleware::decode) runs
//! on the headers-only request before any body byte has been read, and may
//! return a transformer that rewraps the body stream (a decompressor, a
//! tee, a limiter). [`encode`](Middleware::encode) runs after the handler
//! and may replace the outgoing response. Both chains execute in
//! registration order; body-stream transformers compose left-to-right on
//! the raw decoded stream.

use crate::request::Request;
use crate::response::Response;
use crate::stream::BodyStream;

/// A one-shot rewrap of the request body stream.
///
/// Produced per-request by [`Middleware::decode`]; applied to the decoded
/// body stream in registration order.
pub type StreamTransform = Box<dyn for<'a> FnOnce(BodyStream<'a>) -> BodyStream<'a> + Send>;

/// Coerce a closure or fn item into a [`StreamTransform`].
///
/// Plain `fn` items implement the required higher-ranked signature directly:
///
/// ```
/// use postern_core::{transform, BodyStream, SliceStream};
///
/// fn replace(_inner: BodyStream<'_>) -> BodyStream<'_> {
///     Box::new(SliceStream::new("swapped"))
/// }
///
/// let t = transform(replace);
/// # let _ = t;
/// ```
pub fn transform<F>(f: F) -> StreamTransform
where
    F: for<'a> FnOnce(BodyStream<'a>) -> BodyStream<'a> + Send + 'static,
{
    Box::new(f)
}

/// A pair of hooks around a request/response exchange.
///
/// Both methods default to pass-through, so a middleware implements only
/// the side it cares about.
pub trait Middleware: Send + Sync {
    /// Observe or mutate the headers-only request; optionally return a
    /// body-stream transformer.
    fn decode(&self, _req: &mut Request<()>) -> Option<StreamTransform> {
        None
    }

    /// Observe or replace the outgoing response.
    fn encode(&self, _req: &Request<String>, resp: Response) -> Response {
        resp
    }
}

/// A middleware that does nothing on either side.
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {}

/// Adapter turning a decode closure into a [`Middleware`].
pub struct DecodeCallback<F>(F);

impl<F> DecodeCallback<F>
where
    F: Fn(&mut Request<()>) -> Option<StreamTransform> + Send + Sync,
{
    /// Wrap a request-decode callback.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Middleware for DecodeCallback<F>
where
    F: Fn(&mut Request<()>) -> Option<StreamTransform> + Send + Sync,
{
    fn decode(&self, req: &mut Request<()>) -> Option<StreamTransform> {
        (self.0)(req)
    }
}

/// Adapter turning an encode closure into a [`Middleware`].
pub struct EncodeCallback<F>(F);

impl<F> EncodeCallback<F>
where
    F: Fn(&Request<String>, Response) -> Response + Send + Sync,
{
    /// Wrap a response-encode callback.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Middleware for EncodeCallback<F>
where
    F: Fn(&Request<String>, Response) -> Response + Send + Sync,
{
    fn encode(&self, req: &Request<String>, resp: Response) -> Response {
        (self.0)(req, resp)
    }
}
