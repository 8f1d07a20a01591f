//! Route registration and lookup.

use std::fmt;

use postern_core::{HttpError, Method, Request, Response};

use crate::pattern::{Pattern, RouteParams};

/// A boxed route handler: hole values plus the string-bodied request in,
/// response (or abort) out.
pub type BoxHandler =
    Box<dyn Fn(&RouteParams, &Request<String>) -> Result<Response, HttpError> + Send + Sync>;

/// A boxed accept predicate, evaluated on the headers-only request before
/// any body byte is read.
pub type BoxAccept = Box<dyn Fn(&Request<()>) -> Result<(), HttpError> + Send + Sync>;

/// A registered route: pattern, optional method filter, optional accept
/// predicate, handler.
pub struct Route {
    pattern: Pattern,
    method: Option<Method>,
    accept: Option<BoxAccept>,
    handler: BoxHandler,
}

impl Route {
    /// Build a route from a pattern and handler, matching every method.
    pub fn new<H>(pattern: Pattern, handler: H) -> Self
    where
        H: Fn(&RouteParams, &Request<String>) -> Result<Response, HttpError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            pattern,
            method: None,
            accept: None,
            handler: Box::new(handler),
        }
    }

    /// Restrict the route to one method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Install an accept predicate, run on the headers-only request before
    /// the body is read. An error rejects the request with its code and
    /// message.
    #[must_use]
    pub fn accept<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request<()>) -> Result<(), HttpError> + Send + Sync + 'static,
    {
        self.accept = Some(Box::new(predicate));
        self
    }

    /// The route's pattern.
    #[must_use]
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Run the accept predicate, if any.
    pub fn check_accept(&self, req: &Request<()>) -> Result<(), HttpError> {
        match &self.accept {
            Some(predicate) => predicate(req),
            None => Ok(()),
        }
    }

    /// Invoke the handler.
    pub fn invoke(
        &self,
        params: &RouteParams,
        req: &Request<String>,
    ) -> Result<Response, HttpError> {
        (self.handler)(params, req)
    }

    fn matches(&self, method: Method, path: &str) -> Option<RouteParams> {
        if let Some(m) = self.method {
            if m != method {
                return None;
            }
        }
        self.pattern.matches(path)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("method", &self.method)
            .field("accept", &self.accept.is_some())
            .finish()
    }
}

/// Registered routes, matched in reverse registration order.
///
/// Later registrations take priority, so an application can layer a more
/// specific route over a general one it registered earlier.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// An empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route. Appended routes shadow earlier ones on overlap.
    pub fn add(&mut self, route: Route) {
        self.routes.push(route);
    }

    /// Number of registered routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Returns true if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the highest-priority route matching `method` and `path`
    /// (query already stripped), with its captured hole values.
    #[must_use]
    pub fn lookup(&self, method: Method, path: &str) -> Option<(&Route, RouteParams)> {
        self.routes
            .iter()
            .rev()
            .find_map(|route| route.matches(method, path).map(|params| (route, params)))
    }
}

// ============================================================================
// Tests
// ============================================================================
