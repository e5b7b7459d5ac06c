//! Error types for state persistence and store operations.
//!
//! Only [`StateError::ContractViolation`] ever reaches a caller of
//! [`Store`](crate::Store). Everything else is absorbed and logged at the
//! adapter boundary.

use thiserror::Error;

/// Errors that can occur while persisting or mutating state.
#[derive(Debug, Error)]
pub enum StateError {
    /// The host has no persistent storage medium.
    #[error("storage medium unavailable")]
    MediumUnavailable,

    /// Stored record is malformed or carries an unknown type tag.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Key derivation, encryption, or authenticated decryption failed.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The caller misused the store (e.g. merging fields into a non-record value).
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A value could not be serialized for storage.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Cannot communicate with the storage medium.
    #[error("medium error: {0}")]
    Medium(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type alias for state operations.
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    /// Returns true if a load failing with this error should be treated as
    /// "nothing stored" rather than as an environmental fault.
    pub fn is_cache_miss(&self) -> bool {
        matches!(
            self,
            StateError::MediumUnavailable
                | StateError::Deserialization(_)
                | StateError::Crypto(_)
                | StateError::InvalidKey(_)
        )
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}
