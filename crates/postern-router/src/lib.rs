//! Path-pattern routing for the postern HTTP server.
//!
//! Routes pair a [`Pattern`] — literal segments and typed holes like
//! `{id:int}` or `{path:rest}` — with a handler, an optional method filter,
//! and an optional accept predicate that can reject a request before its
//! body is read. The [`Router`] matches in reverse registration order, so
//! later routes shadow earlier ones.
//!
//! # Example
//!
//! ```
//! use postern_core::{Method, Response};
//! use postern_router::{Pattern, Route, Router};
//!
//! let mut router = Router::new();
//! router.add(
//!     Route::new(Pattern::parse("/items/{id:int}").unwrap(), |params, _req| {
//!         let id = params.get_int("id").unwrap();
//!         Ok(Response::ok().body_text(format!("item {id}")))
//!     })
//!     .method(Method::Get),
//! );
//!
//! let (route, params) = router.lookup(Method::Get, "/items/3").unwrap();
//! assert_eq!(params.get_int("id"), Some(3));
//! # let _ = route;
//! ```

#![forbid(unsafe_code)]

mod pattern;
mod route;

pub use pattern::{Pattern, PatternError, RouteParams};
pub use route::{BoxAccept, BoxHandler, Route, Router};
