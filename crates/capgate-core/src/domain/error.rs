//! Error taxonomy for the capability gate.

/// Failure of a single model-adapter call.
///
/// Trial errors never leave the runner: they are counted against the owning
/// task (see `TaskResult::dropped`) and logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrialError {
    #[error("model call failed: {0}")]
    Failed(String),

    #[error("model call timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("model returned score {score} outside [0, 1]")]
    OutOfRange { score: f64 },
}

/// Gate pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("config error: {0}")]
    Config(String),

    #[error("trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("artifact missing: {path}")]
    ArtifactMissing { path: String },

    #[error("artifact already written with different content: {path}")]
    ArtifactConflict { path: String },

    #[error("malformed artifact {path}: {reason}")]
    MalformedArtifact { path: String, reason: String },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    pub fn config(msg: impl Into<String>) -> Self {
        GateError::Config(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        GateError::InvalidState(msg.into())
    }
}

/// Result type for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
