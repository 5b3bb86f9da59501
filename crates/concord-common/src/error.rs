//! Common error types for Concord components.

use thiserror::Error;

/// Result alias used throughout Concord
pub type Result<T> = std::result::Result<T, ConcordError>;

/// Common errors across Concord components
#[derive(Debug, Error)]
pub enum ConcordError {
    /// A cryptographic primitive required at startup is unusable
    #[error("The \"{0}\" algorithm is required for consistent secure settings' hashes")]
    MissingAlgorithm(&'static str),

    /// Published entry does not split into salt and hash
    #[error("published hash [{value}] for secure setting [{key}] is invalid")]
    MalformedPublishedHash { key: String, value: String },

    /// The elected coordinator disagrees with the published view
    #[error("Coordinator node cannot validate consistent setting [{key}]: {reason}")]
    CoordinatorInconsistent { key: String, reason: String },

    /// Key derivation failed unexpectedly
    #[error("Unexpected error when computing PBKDF2 hash: {0}")]
    Derivation(String),

    /// Declaration lacks the consistency-checked property
    #[error("[{0}] is not a consistent setting")]
    NotConsistent(String),

    /// Declaration is not a digestible secure setting
    #[error("[{0}] is not a secure setting")]
    NotSecure(String),

    /// Cluster coordination error
    #[error("Cluster error: {0}")]
    Cluster(String),
}

impl ConcordError {
    /// Returns true if this error reflects corrupted or incompatible
    /// cluster metadata rather than an environment problem
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::MalformedPublishedHash { .. } | Self::CoordinatorInconsistent { .. }
        )
    }
}
