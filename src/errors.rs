//! Shared State Error Hierarchy
//!
//! Errors are split by the layer that raises them. Lock conflicts and
//! rejected writes are *not* errors: they travel as `success = false`
//! responses and resource state transitions.

use config::ConfigError;
use tokio::task::JoinError;

use crate::ScopeKind;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Operation attempted on a cancelled or closed scope
    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// Transport failures (connect, RPC status, background task)
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Value conversion and key validation failures
    #[error(transparent)]
    Value(#[from] ValueError),

    /// Configuration loading failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration that loaded but does not validate
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

/// Scope lifecycle violations.
///
/// These are always reported synchronously to the direct caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// The scope (or one of its ancestors) was cancelled before the
    /// operation started.
    #[error("{scope} scope is already closed")]
    AlreadyClosed { scope: ScopeKind },

    /// The scope was cancelled while the operation was in flight.
    #[error("{scope} scope was cancelled during {operation}")]
    Cancelled {
        scope: ScopeKind,
        operation: &'static str,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// Malformed server address
    #[error("Invalid URI format: {0}")]
    InvalidURI(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    TonicError(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    TonicStatusError(#[from] Box<tonic::Status>),

    /// Background request task failed
    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum ValueError {
    /// Typed record could not be mapped to or from a [`crate::Value`]
    #[error("Value conversion failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// Number that has no representation in the value model
    #[error("Non-finite number {0} cannot be stored")]
    NonFiniteNumber(f64),

    /// Collection write outside the collection's key prefix
    #[error("Key `{key}` does not start with collection prefix `{prefix}`")]
    KeyOutsidePrefix { key: String, prefix: String },
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Network(NetworkError::TonicError(Box::new(e)))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Network(NetworkError::TonicStatusError(Box::new(status)))
    }
}

impl From<JoinError> for Error {
    fn from(e: JoinError) -> Self {
        Error::Network(NetworkError::TaskFailed(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Value(ValueError::Serde(e))
    }
}

impl Error {
    /// Whether the error came from operating on a closed scope.
    pub fn is_scope_closed(&self) -> bool {
        matches!(self, Error::Scope(_))
    }
}
