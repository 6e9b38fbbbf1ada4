//! Error type used across vmlite crates.

use thiserror::Error;

pub type VmliteResult<T> = Result<T, VmliteError>;

#[derive(Debug, Error)]
pub enum VmliteError {
    /// No source produced the asset and no fallback was configured.
    #[error("asset unavailable: {0}")]
    AssetUnavailable(String),

    /// The from-source build failed at a named stage.
    #[error("build failed: {0}")]
    BuildFailure(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// The VMM process could not be started or never exposed its API socket.
    #[error("launch error: {0}")]
    Launch(String),

    /// No live VMM is reachable on the control socket.
    #[error("VM is not running: {0}")]
    NotRunning(String),

    /// The VMM answered with a non-success status, or the call timed out.
    #[error("API error: {0}")]
    Api(String),

    /// The operation is not legal in the current lifecycle state.
    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for VmliteError {
    fn from(err: serde_json::Error) -> Self {
        VmliteError::Internal(format!("json: {}", err))
    }
}
