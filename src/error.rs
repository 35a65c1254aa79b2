use thiserror::Error;

/// Error taxonomy for the Heimdall core (spec.md §7). Each variant is a
/// *kind*, not a wrapped downstream type: adapters and collaborators map
/// their own errors into one of these before they cross a component
/// boundary.
#[derive(Error, Debug)]
pub enum HeimdallError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("circuit open: {0}")]
    CircuitOpen(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("pool closed")]
    PoolClosed,

    #[error("acquire timed out after {0:?}")]
    AcquireTimeout(std::time::Duration),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HeimdallError {
    /// Whether this error kind is the result of a transient backend
    /// condition that a caller's own retry policy already accounted for
    /// (§7 propagation policy: these are never retried a second time
    /// inside the core once they surface).
    pub fn is_transient(&self) -> bool {
        matches!(self, HeimdallError::StorageUnavailable(_) | HeimdallError::Timeout(_))
    }
}

impl Clone for HeimdallError {
    fn clone(&self) -> Self {
        match self {
            HeimdallError::Validation(s) => HeimdallError::Validation(s.clone()),
            HeimdallError::StorageUnavailable(s) => HeimdallError::StorageUnavailable(s.clone()),
            HeimdallError::CircuitOpen(s) => HeimdallError::CircuitOpen(s.clone()),
            HeimdallError::Overloaded(s) => HeimdallError::Overloaded(s.clone()),
            HeimdallError::NotFound(s) => HeimdallError::NotFound(s.clone()),
            HeimdallError::Conflict(s) => HeimdallError::Conflict(s.clone()),
            HeimdallError::Internal(s) => HeimdallError::Internal(s.clone()),
            HeimdallError::PoolClosed => HeimdallError::PoolClosed,
            HeimdallError::AcquireTimeout(d) => HeimdallError::AcquireTimeout(*d),
            HeimdallError::Timeout(s) => HeimdallError::Timeout(s.clone()),
            HeimdallError::Configuration(s) => HeimdallError::Configuration(s.clone()),
            HeimdallError::DependencyUnavailable(s) => HeimdallError::DependencyUnavailable(s.clone()),
            HeimdallError::Io(e) => HeimdallError::Internal(e.to_string()),
            HeimdallError::Serialization(s) => HeimdallError::Serialization(s.clone()),
        }
    }
}

pub type Result<T> = std::result::Result<T, HeimdallError>;

impl From<serde_json::Error> for HeimdallError {
    fn from(e: serde_json::Error) -> Self {
        HeimdallError::Serialization(e.to_string())
    }
}
