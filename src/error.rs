//! Error taxonomy for the library.
//!
//! Callers always see either a successfully decoded result or one typed
//! error. Transient conditions (rate limiting, transient server errors,
//! expired-token responses) are recovered inside the transport and never
//! surface here; everything else propagates uncaught and unreclassified, so
//! callers can match on the exact failure class.

use reqwest::StatusCode;
use thiserror::Error;

/// Top-level error type of the library.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable credential exists, or the initial grant failed.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A classified non-2xx API response.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The token endpoint rejected a refresh attempt.
    #[error("token refresh rejected: {0}")]
    RefreshTokenFailed(String),

    /// The request kept failing until the attempt budget ran out.
    #[error("{method} {url} failed {attempts} times")]
    RetriesExhausted {
        method: String,
        url: String,
        attempts: usize,
    },

    /// An endpoint that was expected to return a payload sent an empty body.
    #[error("empty response body from {0}")]
    EmptyResponse(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classified 4xx outcomes, each carrying the server-provided error message
/// when one was present in the response body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("400 Bad Request{}", suffix(.0))]
    BadRequest(Option<String>),

    #[error("401 Unauthorized{}", suffix(.0))]
    Unauthorized(Option<String>),

    #[error("403 Forbidden{}", suffix(.0))]
    Forbidden(Option<String>),

    #[error("404 Not Found{}", suffix(.0))]
    NotFound(Option<String>),

    #[error("405 Method Not Allowed{}", suffix(.0))]
    NotAllowed(Option<String>),

    /// A status code the transport has no dedicated handling for.
    #[error("unhandled status code {status}{}", suffix(.message))]
    Unhandled {
        status: StatusCode,
        message: Option<String>,
    },
}

impl ApiError {
    /// Returns the server-provided error message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ApiError::BadRequest(m)
            | ApiError::Unauthorized(m)
            | ApiError::Forbidden(m)
            | ApiError::NotFound(m)
            | ApiError::NotAllowed(m)
            | ApiError::Unhandled { message: m, .. } => m.as_deref(),
        }
    }
}

fn suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}
