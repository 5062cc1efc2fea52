//! Controller-specific error types.
//!
//! Errors of the monitor process that are not covered by `install_core`.

use install_core::CoreError;
use kube::Error as KubeError;
use thiserror::Error;

/// Errors that can occur in the install monitor.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Orchestration core error
    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Metrics / probe server failure
    #[error("Server error: {0}")]
    Server(String),

    /// A background task panicked or exited
    #[error("Task failed: {0}")]
    Task(String),
}
