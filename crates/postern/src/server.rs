//! Server configuration, registration surface, and the accept loop.

use std::fmt;
use std::io;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use postern_core::{
    DecodeCallback, EncodeCallback, HttpError, Method, Middleware, Request, Response, StatusCode,
    StreamTransform,
};
use postern_http::{ParseLimits, DEFAULT_BUF_SIZE, DEFAULT_MAX_BODY_SIZE};
use postern_router::{Pattern, PatternError, Route, RouteParams, Router};
use tracing::{info, warn};

use crate::connection;

/// The injected worker-spawn function: receives one unit of connection work.
pub type SpawnFn = Arc<dyn Fn(Box<dyn FnOnce() + Send>) + Send + Sync>;

/// The injected monotonic clock, in seconds.
pub type ClockFn = Arc<dyn Fn() -> f64 + Send + Sync>;

/// The fallback handler invoked when no route matches.
pub type BoxTopHandler =
    Box<dyn Fn(&Request<String>) -> Result<Response, HttpError> + Send + Sync>;

/// Error types for server startup.
#[derive(Debug)]
pub enum ConfigError {
    /// Binding the listen address failed.
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying error.
        source: io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "failed to bind {addr}: {source}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
        }
    }
}

/// Signals a running server to stop accepting connections.
///
/// Stopping is best-effort: the accept loop observes the flag on its next
/// iteration, so a blocked `accept` holds the loop until one more
/// connection (or accept failure) arrives.
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Set the stop flag.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once the stop flag is set.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared with every connection worker.
pub(crate) struct Shared {
    pub(crate) router: RwLock<Router>,
    pub(crate) top: RwLock<BoxTopHandler>,
    pub(crate) middlewares: RwLock<Vec<Box<dyn Middleware>>>,
    pub(crate) parse_limits: ParseLimits,
    pub(crate) buf_size: usize,
    pub(crate) body_limit: usize,
    pub(crate) max_keep_alive_s: f64,
    pub(crate) clock: ClockFn,
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    addr: String,
    port: u16,
    buf_size: usize,
    body_limit: usize,
    max_keep_alive_s: f64,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    mask_sigpipe: bool,
    parse_limits: ParseLimits,
    spawn: SpawnFn,
    clock: ClockFn,
    middlewares: Vec<Box<dyn Middleware>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        let origin = Instant::now();
        Self {
            addr: "127.0.0.1".to_string(),
            port: 8080,
            buf_size: DEFAULT_BUF_SIZE,
            body_limit: DEFAULT_MAX_BODY_SIZE,
            max_keep_alive_s: -1.0,
            read_timeout: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(30)),
            mask_sigpipe: true,
            parse_limits: ParseLimits::default(),
            spawn: Arc::new(default_spawn),
            clock: Arc::new(move || origin.elapsed().as_secs_f64()),
            middlewares: Vec::new(),
        }
    }
}

fn default_spawn(work: Box<dyn FnOnce() + Send>) {
    let spawned = std::thread::Builder::new()
        .name("postern-connection".to_string())
        .spawn(work);
    if let Err(e) = spawned {
        warn!(error = %e, "failed to spawn connection worker");
    }
}

impl ServerBuilder {
    /// Start from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind address (default `127.0.0.1`).
    #[must_use]
    pub fn addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Bind port (default `8080`).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Per-connection I/O buffer size (default 16 KiB).
    #[must_use]
    pub fn buf_size(mut self, size: usize) -> Self {
        self.buf_size = size;
        self
    }

    /// Maximum materialized request body size (default 1 MiB). Larger
    /// bodies are rejected with `413 Payload Too Large`.
    #[must_use]
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Maximum keep-alive connection lifetime in seconds; negative means
    /// unbounded (the default).
    #[must_use]
    pub fn max_keep_alive(mut self, seconds: f64) -> Self {
        self.max_keep_alive_s = seconds;
        self
    }

    /// Socket read timeout (default 30 s; `None` disables). Bounds both
    /// idle keep-alive waits and mid-request stalls.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Socket write timeout (default 30 s; `None` disables).
    #[must_use]
    pub fn write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Whether the broken-pipe signal must stay masked (default on).
    ///
    /// Rust's standard runtime already ignores `SIGPIPE` on Unix before
    /// `main`, and write failures on closed sockets are handled as
    /// connection closes either way. Embedding applications that restore
    /// the default signal disposition must keep it ignored while the
    /// server runs.
    #[must_use]
    pub fn mask_sigpipe(mut self, mask: bool) -> Self {
        self.mask_sigpipe = mask;
        self
    }

    /// Request-head parsing limits.
    #[must_use]
    pub fn parse_limits(mut self, limits: ParseLimits) -> Self {
        self.parse_limits = limits;
        self
    }

    /// Worker-spawn function (default: one OS thread per connection).
    ///
    /// Receives each accepted connection's work as a closure; a thread
    /// pool or a same-thread executor (for tests) are drop-in replacements.
    #[must_use]
    pub fn spawn(mut self, spawn: impl Fn(Box<dyn FnOnce() + Send>) + Send + Sync + 'static) -> Self {
        self.spawn = Arc::new(spawn);
        self
    }

    /// Monotonic clock in seconds (default: process-relative `Instant`).
    /// Injectable for tests and for sharing a clock with the application.
    #[must_use]
    pub fn clock(mut self, clock: impl Fn() -> f64 + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Append a middleware to the initial list.
    #[must_use]
    pub fn middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    /// Finalize the configuration.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            addr: self.addr,
            port: self.port,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            mask_sigpipe: self.mask_sigpipe,
            stop: Arc::new(AtomicBool::new(false)),
            spawn: self.spawn,
            shared: Arc::new(Shared {
                router: RwLock::new(Router::new()),
                top: RwLock::new(Box::new(default_top_handler)),
                middlewares: RwLock::new(self.middlewares),
                parse_limits: self.parse_limits,
                buf_size: self.buf_size,
                body_limit: self.body_limit,
                max_keep_alive_s: self.max_keep_alive_s,
                clock: self.clock,
            }),
        }
    }
}

fn default_top_handler(_req: &Request<String>) -> Result<Response, HttpError> {
    Ok(Response::new(StatusCode::NOT_FOUND).body_text("Not Found"))
}

/// A blocking HTTP/1.1 server: one injected-spawn worker per connection.
///
/// Routes, the top handler, and middleware can be registered before or
/// after [`run`](Server::run); registration after startup is safe (the
/// connection pipeline takes coarse read locks).
///
/// # Example
///
/// ```no_run
/// use postern::{Pattern, Response, Route, Server};
///
/// let server = Server::builder().port(8080).build();
/// server.add_route(Route::new(Pattern::parse("/hello").unwrap(), |_params, _req| {
///     Ok(Response::ok().body_text("hi"))
/// }));
/// server.run().unwrap();
/// ```
pub struct Server {
    addr: String,
    port: u16,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    mask_sigpipe: bool,
    stop: Arc<AtomicBool>,
    spawn: SpawnFn,
    shared: Arc<Shared>,
}

impl Server {
    /// Start configuring a server.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The configured bind address.
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The configured bind port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether broken-pipe masking was requested (see
    /// [`ServerBuilder::mask_sigpipe`]).
    #[must_use]
    pub fn mask_sigpipe(&self) -> bool {
        self.mask_sigpipe
    }

    /// Append a route. Later registrations shadow earlier ones.
    pub fn add_route(&self, route: Route) {
        self.shared.router.write().unwrap().add(route);
    }

    /// Register a handler for a method and path pattern.
    ///
    /// Shorthand for [`add_route`](Server::add_route) with a method filter;
    /// use `add_route` directly for accept predicates or any-method routes.
    pub fn add_path_handler<H>(
        &self,
        method: Method,
        pattern: &str,
        handler: H,
    ) -> Result<(), PatternError>
    where
        H: Fn(&RouteParams, &Request<String>) -> Result<Response, HttpError>
            + Send
            + Sync
            + 'static,
    {
        let pattern = Pattern::parse(pattern)?;
        self.add_route(Route::new(pattern, handler).method(method));
        Ok(())
    }

    /// Replace the fallback handler invoked when no route matches
    /// (default: `404 Not Found`).
    pub fn set_top_handler<H>(&self, handler: H)
    where
        H: Fn(&Request<String>) -> Result<Response, HttpError> + Send + Sync + 'static,
    {
        *self.shared.top.write().unwrap() = Box::new(handler);
    }

    /// Append a middleware to the chain.
    pub fn add_middleware(&self, middleware: impl Middleware + 'static) {
        self.shared
            .middlewares
            .write()
            .unwrap()
            .push(Box::new(middleware));
    }

    /// Append a request-decode callback: sees the headers-only request and
    /// may return a body-stream transformer.
    pub fn add_decode_request_cb<F>(&self, f: F)
    where
        F: Fn(&mut Request<()>) -> Option<StreamTransform> + Send + Sync + 'static,
    {
        self.add_middleware(DecodeCallback::new(f));
    }

    /// Append a response-encode callback: sees the string-bodied request
    /// and may replace the outgoing response.
    pub fn add_encode_response_cb<F>(&self, f: F)
    where
        F: Fn(&Request<String>, Response) -> Response + Send + Sync + 'static,
    {
        self.add_middleware(EncodeCallback::new(f));
    }

    /// A handle that can stop the accept loop from another thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Bind the configured address and serve until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Bind`] if the listen address cannot be bound.
    /// Accept failures after that are logged and do not end the loop.
    pub fn run(&self) -> Result<(), ConfigError> {
        let addr = format!("{}:{}", self.addr, self.port);
        let listener = TcpListener::bind(&addr).map_err(|source| ConfigError::Bind {
            addr: addr.clone(),
            source,
        })?;
        self.run_with_listener(listener)
    }

    /// Serve on a pre-bound listener until stopped.
    pub fn run_with_listener(&self, listener: TcpListener) -> Result<(), ConfigError> {
        match listener.local_addr() {
            Ok(local) => info!(addr = %local, "listening"),
            Err(_) => info!("listening"),
        }

        loop {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            let socket = match listener.accept() {
                Ok((socket, _peer)) => socket,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = socket.set_read_timeout(self.read_timeout) {
                warn!(error = %e, "failed to set read timeout");
            }
            if let Err(e) = socket.set_write_timeout(self.write_timeout) {
                warn!(error = %e, "failed to set write timeout");
            }
            let shared = Arc::clone(&self.shared);
            (self.spawn)(Box::new(move || connection::handle(&shared, socket)));
        }

        info!("stopped");
        Ok(())
    }
}
