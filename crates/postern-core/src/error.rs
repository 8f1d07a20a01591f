//! The failure value handlers and accept predicates use to abort a request.

use std::fmt;

use crate::response::StatusCode;

/// A request-level failure carrying a status code and a message.
///
/// Returned from handlers to abort with a specific status (the connection
/// loop writes the corresponding response and honors keep-alive), and from
/// accept predicates to reject a request before its body is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Build a failure value from a status and message.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Build a failure value with a formatted message.
    ///
    /// ```
    /// use postern_core::{HttpError, StatusCode};
    ///
    /// let id = 7;
    /// let err = HttpError::msg(StatusCode::NOT_FOUND, format_args!("no item {id}"));
    /// assert_eq!(err.message(), "no item 7");
    /// ```
    #[must_use]
    pub fn msg(status: StatusCode, args: fmt::Arguments<'_>) -> Self {
        Self::new(status, args.to_string())
    }

    /// The carried status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The carried message, used as the error response body.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for HttpError {}
