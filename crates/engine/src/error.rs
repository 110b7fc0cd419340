use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Command execution failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Program failed: {0:#}")]
    Program(anyhow::Error),

    /// The backend refused the request and said why.
    #[error("{0}")]
    Rejected(String),

    /// The backend failed with something that is not a message. Displayed
    /// as JSON so the diagnostic is always a single readable string.
    #[error("{0}")]
    Payload(serde_json::Value),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid engine response: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_displays_as_json() {
        let err = EngineError::Payload(json!("boom"));
        assert_eq!(err.to_string(), "\"boom\"");

        let err = EngineError::Payload(json!({ "code": 403 }));
        assert_eq!(err.to_string(), "{\"code\":403}");
    }

    #[test]
    fn test_program_error_keeps_chain() {
        let err = EngineError::Program(anyhow::anyhow!("inner").context("loading config"));
        assert_eq!(err.to_string(), "Program failed: loading config: inner");
    }
}
