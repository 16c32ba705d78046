//! Error types for revalidate operations

use thiserror::Error;

/// Storage driver errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DriverError {
    #[error("Driver unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Driver lock poisoned")]
    LockPoisoned,

    #[error("No tokio runtime available to run the sweeper")]
    RuntimeUnavailable,

    #[error("Driver has been ended")]
    Ended,
}

impl DriverError {
    /// Build an `Unavailable` error from anything displayable.
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            reason: reason.to_string(),
        }
    }
}

/// Value provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider failed: {reason}")]
    Failed { reason: String },
}

impl ProviderError {
    /// Build a `Failed` error from anything displayable.
    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all revalidate errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RevalidateError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache has been shut down")]
    Closed,
}

/// Result type alias for revalidate operations.
pub type RevalidateResult<T> = Result<T, RevalidateError>;

// =============================================================================
// TESTS
// =============================================================================
