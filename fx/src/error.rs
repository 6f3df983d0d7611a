//! FX engine error types.

use thiserror::Error;

/// Errors surfaced by the rate-retrieval core.
#[derive(Debug, Error)]
pub enum FxError {
    /// Malformed or contradictory request.
    #[error("Invalid request: {0}")]
    Request(String),

    /// Provider identifier not present in the registry.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    /// The registry has no providers at all.
    #[error("No rate providers available")]
    NoProvidersAvailable,

    /// Cache miss and every provider attempt came back empty.
    #[error("No rates found")]
    NoRatesFound,

    /// The rate store could not be read or written.
    #[error("Rate storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An observation violates the store invariants.
    #[error("Invalid rate observation: {0}")]
    InvalidObservation(String),
}

impl FxError {
    /// Check if the caller may retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FxError::StorageUnavailable(_))
    }

    /// Get a stable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::Request(_) => "REQUEST_ERROR",
            FxError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            FxError::NoProvidersAvailable => "NO_PROVIDERS_AVAILABLE",
            FxError::NoRatesFound => "NO_RATES_FOUND",
            FxError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            FxError::InvalidObservation(_) => "INVALID_OBSERVATION",
        }
    }
}

impl From<sqlx::Error> for FxError {
    fn from(e: sqlx::Error) -> Self {
        FxError::StorageUnavailable(e.to_string())
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;

/// Outcome of a single provider operation that did not produce a rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The provider does not implement the operation.
    #[error("not supported by this provider")]
    NotSupported,

    /// Network, parse or upstream failure.
    #[error("provider failure: {0}")]
    Failure(String),
}

/// Result type for provider operations.
pub type SourceResult<T> = Result<T, SourceError>;
