//! Engine-level error taxonomy for vigil.
//!
//! Only genuine request faults become `Err` values: malformed scopes,
//! unknown ids, storage failures on mutation paths, collaborator
//! transport errors. Insufficient evidence and verification exhaustion
//! are NOT errors; they are `failed` diagnosis outcomes with a reason
//! and a confidence floor (see `diagnosis`).

use vigil_state::{IncidentId, StorageError};

/// Vigil engine errors.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("incident not found: {0}")]
    IncidentNotFound(IncidentId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("collaborator error: {0}")]
    Collaborator(String),
}

/// Result type for vigil engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
