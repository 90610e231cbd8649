//! Error kinds shared by every component of the dispatch pipeline.

use thiserror::Error;

/// The kinds of failure a source adapter, the registry, or the dispatcher can
/// raise. Only [`KukurError::Transient`] and [`KukurError::Timeout`] are
/// retried by the dispatcher (see `kukur-registry`'s `SourceWrapper`); every
/// other kind surfaces immediately.
#[derive(Debug, Error)]
pub enum KukurError {
    /// Configuration references an unknown source type, a missing required
    /// key, or invalid adapter options.
    #[error("invalid source: {0}")]
    InvalidSource(String),

    /// An RPC or CLI invocation named a source absent from configuration.
    #[error("source does not exist: {0}")]
    UnknownSource(String),

    /// Data returned by a backend is malformed, e.g. a missing series column.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Metadata returned by a backend is missing required columns.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The shape of a list/metadata query result does not match the
    /// declared columns.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The adapter does not implement an optional capability.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// An adapter call exceeded its configured timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Any other adapter failure. Retried like [`KukurError::Timeout`].
    #[error("transient error: {0}")]
    Transient(#[source] anyhow::Error),

    /// Bad or missing API key at the RPC boundary.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl KukurError {
    /// Whether the dispatcher's retry loop should retry this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, KukurError::Transient(_) | KukurError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, KukurError>;
