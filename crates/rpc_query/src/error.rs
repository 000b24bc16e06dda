// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Error types for RPC calls, queries, and mutations.
//!
//! Transports report failures as [`RpcError`]. Before a failure reaches query or mutation state it
//! is normalized into [`ErrorInfo`], the single shape observers see.

use std::{fmt, sync::Arc};

use thiserror::Error;

/// Status code reported for failures that never reached a server.
pub const NO_RESPONSE: u16 = 0;

/// A failure reported by a [`Transport`](crate::Transport) or by the typed call layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RpcError {
    /// The call could not be delivered or its response was lost.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The input could not be encoded or the response could not be decoded.
    #[error("failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The requested record or procedure does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The server rejected the input.
    #[error("{0}")]
    Validation(String),

    /// The call conflicts with work already in progress.
    #[error("{0}")]
    Conflict(String),

    /// Any other server-side failure, carrying its HTTP-like status code.
    #[error("{message}")]
    Server {
        /// HTTP-like status code returned by the server.
        code: u16,
        /// Human-readable message returned by the server.
        message: String,
    },
}

impl RpcError {
    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Decode(_) => ErrorKind::Transport,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Server { .. } => ErrorKind::Server,
        }
    }

    /// Returns the HTTP-like status code for this error.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::Server { code, .. } => *code,
            other => other.kind().default_code(),
        }
    }
}

/// Category of an [`ErrorInfo`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Connectivity or serialization failure.
    Transport,
    /// The requested record does not exist.
    NotFound,
    /// Malformed input.
    Validation,
    /// The operation collides with one already running.
    Conflict,
    /// Failure raised by the server or by a misbehaving callback.
    Server,
}

impl ErrorKind {
    /// Returns the status code used when no explicit code is known.
    #[must_use]
    pub fn default_code(self) -> u16 {
        match self {
            Self::Transport => NO_RESPONSE,
            Self::NotFound => 404,
            Self::Validation => 400,
            Self::Conflict => 409,
            Self::Server => 500,
        }
    }

    /// Returns a short, stable name for logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::NotFound => "not_found",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Server => "server",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized failure information published by queries and mutations.
///
/// Every failure mode, whether raised by the transport, by the server, or by the client itself,
/// is converted into this shape. Kinds are told apart by [`code`](Self::code).
///
/// # Examples
///
/// ```
/// use rpc_query::{ErrorInfo, ErrorKind, RpcError};
///
/// let info = ErrorInfo::from(RpcError::NotFound("No post with id 'p9'".to_string()));
/// assert_eq!(info.kind(), ErrorKind::NotFound);
/// assert_eq!(info.code(), 404);
/// assert_eq!(info.message(), "No post with id 'p9'");
/// ```
#[derive(Clone, Debug)]
pub struct ErrorInfo {
    kind: ErrorKind,
    code: u16,
    message: String,
    cause: Option<Arc<RpcError>>,
}

impl ErrorInfo {
    /// Creates an error with the kind's default code and no cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: kind.default_code(),
            message: message.into(),
            cause: None,
        }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    /// Returns the error category.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the HTTP-like status code; [`NO_RESPONSE`] when no server answered.
    #[must_use]
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Returns the status to present to users, falling back to 500 when no server answered.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.code == NO_RESPONSE { 500 } else { self.code }
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the transport error this information was built from, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&RpcError> {
        self.cause.as_deref()
    }
}

impl From<RpcError> for ErrorInfo {
    fn from(error: RpcError) -> Self {
        Self {
            kind: error.kind(),
            code: error.code(),
            message: error.to_string(),
            cause: Some(Arc::new(error)),
        }
    }
}

impl PartialEq for ErrorInfo {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.code == other.code && self.message == other.message
    }
}

impl Eq for ErrorInfo {}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for ErrorInfo {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// A specialized [`Result`] type for typed RPC calls.
pub type Result<T> = std::result::Result<T, ErrorInfo>;
