//! Error types for the orchestration core.
//!
//! Validation-level problems never show up here: they degrade to a
//! `pending` or `error` validation status. What remains are failures that
//! abort a single transition (conflicts, missing rows, forbidden operations)
//! or a whole monitor pass (store unavailable, bad configuration).

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by the orchestration core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// No transition rule matched the entity's current state.
    #[error("no matching transition rule for transition type {transition_type} from state \"{state}\"")]
    NoMatchingTransition {
        /// Transition type that was requested
        transition_type: String,
        /// State the entity was in
        state: String,
    },

    /// A status-guarded update touched zero rows because another writer
    /// changed the status first.
    #[error("{entity} {id}: expected status \"{expected}\" but the row no longer matches")]
    GuardedUpdateConflict {
        /// Entity kind ("host" / "cluster")
        entity: &'static str,
        /// Entity ID
        id: Uuid,
        /// Status the writer expected
        expected: String,
    },

    /// Entity not found
    #[error("{entity} {id} not found")]
    NotFound {
        /// Entity kind ("host" / "cluster")
        entity: &'static str,
        /// Entity ID
        id: Uuid,
    },

    /// Joined data required by a validation could not be loaded or parsed
    #[error("validation context error: {0}")]
    ValidationContext(String),

    /// Invalid or unmapped configuration (unknown category, bad duration, ...)
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A downstream collaborator (hardware, connectivity, operators) failed
    #[error("collaborator error: {0}")]
    Collaborator(String),

    /// Request conflicts with the entity's current state or data
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation not allowed in the entity's current situation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Caller supplied an invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// JSON serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence layer failure (connection lost, query failed, ...)
    #[error("store error: {0}")]
    Store(String),
}

impl CoreError {
    /// HTTP-equivalent status code for API layers sitting on top of the core.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoMatchingTransition { .. } | Self::GuardedUpdateConflict { .. } | Self::Conflict(_) => 409,
            Self::NotFound { .. } => 404,
            Self::Forbidden(_) => 403,
            Self::InvalidArgument(_) => 400,
            Self::Collaborator(_) => 503,
            Self::ValidationContext(_)
            | Self::Configuration(_)
            | Self::Serialization(_)
            | Self::Store(_) => 500,
        }
    }

    /// Whether the failure only affects the current entity for this pass.
    ///
    /// Transient errors are logged and the entity is retried on the next
    /// monitor pass; everything else is treated as systemic.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::GuardedUpdateConflict { .. }
                | Self::Collaborator(_)
                | Self::NoMatchingTransition { .. }
                | Self::NotFound { .. }
                | Self::ValidationContext(_)
        )
    }

    /// Shorthand for a host not-found error
    #[must_use]
    pub fn host_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "host", id }
    }

    /// Shorthand for a cluster not-found error
    #[must_use]
    pub fn cluster_not_found(id: Uuid) -> Self {
        Self::NotFound { entity: "cluster", id }
    }
}

/// Result alias used across the crate
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let err = CoreError::NoMatchingTransition {
            transition_type: "InstallHost".to_string(),
            state: "disabled".to_string(),
        };
        assert_eq!(err.status_code(), 409);
        assert!(err.to_string().contains("InstallHost"));
        assert!(err.to_string().contains("\"disabled\""));

        assert_eq!(CoreError::Configuration("x".into()).status_code(), 500);
        assert_eq!(CoreError::Forbidden("x".into()).status_code(), 403);
        assert_eq!(CoreError::Conflict("x".into()).status_code(), 409);
        assert_eq!(CoreError::host_not_found(Uuid::nil()).status_code(), 404);
    }

    #[test]
    fn test_transient_classification() {
        let conflict = CoreError::GuardedUpdateConflict {
            entity: "host",
            id: Uuid::nil(),
            expected: "known".to_string(),
        };
        assert!(conflict.is_transient());
        assert!(!CoreError::Store("connection refused".into()).is_transient());
        assert!(!CoreError::Configuration("bad".into()).is_transient());
    }
}
