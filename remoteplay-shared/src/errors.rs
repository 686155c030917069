//! Error taxonomy for remoteplay.
//!
//! Provider and supervisor failures are classified here so the controller can
//! decide which ones degrade to a cached `Unknown`/`Error` state and which ones
//! are fatal to the current operation.

use thiserror::Error;

/// Result alias used across the remoteplay crates.
pub type RemoteplayResult<T> = Result<T, RemoteplayError>;

#[derive(Debug, Error)]
pub enum RemoteplayError {
    /// Network failure or unexpected response from the machine provider.
    #[error("provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Lookup by id or name matched nothing.
    #[error("machine not found: {0}")]
    MachineNotFound(String),

    /// A supervised executable could not be launched.
    #[error("process launch failed: {0}")]
    ProcessLaunch(String),

    /// The provider or remote session rejected our credentials.
    #[error("authentication rejected: {0}")]
    AuthenticationRejected(String),

    /// The requested action does not apply to the machine's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Waited longer than allowed for a transition to settle.
    #[error("timed out: {0}")]
    TimedOut(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl RemoteplayError {
    /// Whether the failure is transient and worth retrying on the next poll.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteplayError::ProviderUnavailable(_))
    }
}
