//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Coarse error classification callers branch on.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PreconditionFailed,
    Internal,
    Conflict,
}

/// Domain-level error.
///
/// Every variant except `Conflict` carries a stable `code` and a localizable
/// message `key` (e.g. `Errors.User.NotFound`). Callers should match on the
/// variant or on [`DomainError::kind`], never on the rendered text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input, or an ambiguous combination of inputs.
    #[error("invalid argument ({code}): {key}")]
    InvalidArgument { code: &'static str, key: &'static str },

    /// A referenced aggregate does not exist.
    #[error("not found ({code}): {key}")]
    NotFound { code: &'static str, key: &'static str },

    /// The target aggregate must not exist yet, but does.
    #[error("already exists ({code}): {key}")]
    AlreadyExists { code: &'static str, key: &'static str },

    /// A state-machine rule was violated or a required policy is missing.
    #[error("precondition failed ({code}): {key}")]
    PreconditionFailed { code: &'static str, key: &'static str },

    /// Unexpected or corrupt data (e.g. an unknown event type in the log).
    #[error("internal error ({code}): {key}: {detail}")]
    Internal {
        code: &'static str,
        key: &'static str,
        detail: String,
    },

    /// Optimistic concurrency failure (stale aggregate version).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn invalid_argument(code: &'static str, key: &'static str) -> Self {
        Self::InvalidArgument { code, key }
    }

    pub fn not_found(code: &'static str, key: &'static str) -> Self {
        Self::NotFound { code, key }
    }

    pub fn already_exists(code: &'static str, key: &'static str) -> Self {
        Self::AlreadyExists { code, key }
    }

    pub fn precondition(code: &'static str, key: &'static str) -> Self {
        Self::PreconditionFailed { code, key }
    }

    pub fn internal(code: &'static str, key: &'static str, detail: impl Into<String>) -> Self {
        Self::Internal {
            code,
            key,
            detail: detail.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::Conflict(_) => ErrorKind::Conflict,
        }
    }

    /// Stable error code (`"CONFLICT"` for concurrency failures).
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument { code, .. }
            | Self::NotFound { code, .. }
            | Self::AlreadyExists { code, .. }
            | Self::PreconditionFailed { code, .. }
            | Self::Internal { code, .. } => code,
            Self::Conflict(_) => "CONFLICT",
        }
    }

    /// Localizable message key.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::InvalidArgument { key, .. }
            | Self::NotFound { key, .. }
            | Self::AlreadyExists { key, .. }
            | Self::PreconditionFailed { key, .. }
            | Self::Internal { key, .. } => key,
            Self::Conflict(_) => "Errors.Concurrency",
        }
    }
}
