//! Error types for the statement-execution core.

use std::fmt;

/// Location of a server-reported error within the submitted SQL text.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ErrorLocation {
    /// 1-based line number.
    pub line: i32,
    /// 1-based column number.
    pub column: i32,
}

/// One frame of a server-side failure stack trace.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
pub struct FailureInfo {
    /// Fully-qualified exception type name.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Exception message.
    pub message: Option<String>,
    /// Source location, if known.
    pub location: Option<ErrorLocation>,
    /// Raw stack frames, as reported by the server.
    #[serde(default)]
    pub stack: Vec<String>,
    /// Suppressed causes attached alongside the primary cause.
    #[serde(default)]
    pub suppressed: Vec<FailureInfo>,
    /// The exception that caused this one, if any. Boxed because `FailureInfo`
    /// is self-referential.
    pub cause: Option<Box<FailureInfo>>,
}

/// A structured error returned by the server on a statement page.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct ServerErrorInfo {
    /// Server-assigned numeric error code.
    #[serde(rename = "errorCode")]
    pub error_code: i32,
    /// Short machine-readable error name (e.g. `SYNTAX_ERROR`).
    #[serde(rename = "errorName")]
    pub error_name: String,
    /// Broad error category (e.g. `USER_ERROR`, `INTERNAL_ERROR`).
    #[serde(rename = "errorType")]
    pub error_type: String,
    /// Human-readable message.
    pub message: String,
    /// Location of the offending SQL, if applicable.
    #[serde(rename = "errorLocation")]
    pub error_location: Option<ErrorLocation>,
    /// Extended diagnostic information.
    #[serde(rename = "failureInfo")]
    pub failure_info: Option<FailureInfo>,
}

impl fmt::Display for ServerErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, code {}): {}",
            self.error_name, self.error_type, self.error_code, self.message
        )
    }
}

/// Errors produced by the statement-execution core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A response could not be parsed, carried an unexpected status code, or
    /// otherwise violated the wire contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server reported a structured error on a statement page.
    #[error("server error: {0}")]
    Server(ServerErrorInfo),

    /// The statement did not finish before its configured timeout elapsed.
    #[error("statement timed out")]
    Timeout,

    /// The statement was cancelled by the caller or an external token.
    #[error("statement was cancelled")]
    Cancelled,

    /// A JSON value could not be decoded into its declared logical type.
    #[error("failed to decode value as {type_name}: {reason}")]
    Decode {
        /// The declared type string being decoded.
        type_name: String,
        /// Human-readable decoding failure.
        reason: String,
    },

    /// The caller violated a usage invariant (e.g. concurrent `next()` calls,
    /// a zero-sized buffer budget, a missing required argument).
    #[error("programming error: {0}")]
    Programming(String),

    /// Several errors were captured concurrently (typically by the
    /// background fetcher) and are surfaced together.
    #[error("{} errors occurred: {}", .0.len(), join_messages(.0))]
    Composite(Vec<Error>),

    /// Transport-level failure talking to the server.
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// A response body was not valid JSON, or did not match the expected
    /// page shape.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

fn join_messages(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build a composite error from a non-empty list of captured errors.
    ///
    /// # Panics
    ///
    /// Panics if `errors` is empty; callers must not surface an empty
    /// aggregate.
    pub fn composite(errors: Vec<Error>) -> Error {
        assert!(!errors.is_empty(), "composite error must not be empty");
        if errors.len() == 1 {
            errors.into_iter().next().expect("checked len == 1")
        } else {
            Error::Composite(errors)
        }
    }

    /// True if this error, or any error nested inside a [`Error::Composite`],
    /// is a [`Error::Timeout`].
    pub fn contains_timeout(&self) -> bool {
        match self {
            Error::Timeout => true,
            Error::Composite(errors) => errors.iter().any(Error::contains_timeout),
            _ => false,
        }
    }

    /// True if this error, or any error nested inside a [`Error::Composite`],
    /// is a [`Error::Cancelled`].
    pub fn contains_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Composite(errors) => errors.iter().any(Error::contains_cancelled),
            _ => false,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
