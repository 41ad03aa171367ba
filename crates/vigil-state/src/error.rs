//! Error types for vigil-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection error
    #[error("database connection failed: {0}")]
    Connection(String),

    /// Backend query error
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Incident not found by id
    #[error("incident not found: {incident_id}")]
    IncidentNotFound { incident_id: String },

    /// Incident exists but is not in the expected status
    #[error("incident {incident_id} is {status}, expected {expected}")]
    InvalidIncidentState {
        incident_id: String,
        status: String,
        expected: String,
    },

    /// Malformed fingerprint string (must be 64 lowercase hex chars)
    #[error("invalid fingerprint: {fingerprint}")]
    InvalidFingerprint { fingerprint: String },

    /// A stream or store record that cannot be decoded
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

impl From<surrealdb::Error> for StorageError {
    fn from(err: surrealdb::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
