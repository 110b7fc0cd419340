use engine::EngineError;
use stackrun_core::{RunState, SessionKey};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("No secrets encryption key recorded for session {0}")]
    MissingEncryptionKey(SessionKey),

    #[error("Invalid run state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Outputs do not match the expected shape: {0}")]
    Outputs(#[from] serde_json::Error),
}

impl OrchestratorError {
    pub fn invalid_transition(from: RunState, to: RunState) -> Self {
        Self::InvalidTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        }
    }

    /// One-line, human readable description of the failure.
    ///
    /// Structured errors yield their message; raw backend payloads are
    /// rendered as JSON.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Engine(EngineError::Payload(value)) => {
                serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
