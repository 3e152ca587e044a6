//! Error Types
//!
//! Only configuration mistakes and execution failures are errors. Routing
//! anomalies (no agent, loops, long chains) and failed tool runs are carried
//! as values in [`crate::AgentResponse`] and [`crate::ToolResult`].

use thiserror::Error;

/// Result type alias for switchboard operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Switchboard error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// LLM provider error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Provider unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An agent name was requested that was never registered
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// A tool name was requested that was never registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// An agent failed while doing its work
    #[error("Agent '{agent}' failed: {message}")]
    AgentFailed { agent: String, message: String },

    /// Maximum tool rounds reached in one turn
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Io(_))
    }

    /// Whether this error is a programming mistake rather than a runtime failure
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::AgentNotFound(_) | Self::ToolNotFound(_) | Self::Config(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(msg) => format!("The AI service encountered an error: {msg}"),
            Self::ProviderUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::AgentNotFound(name) => format!("The agent '{name}' is not available."),
            Self::ToolNotFound(name) => format!("The tool '{name}' is not available."),
            Self::AgentFailed { agent, .. } => {
                format!("The '{agent}' agent could not complete the request.")
            }
            Self::MaxIterations(_) => {
                "The request needed too many tool calls. Please try a simpler query.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(AgentError::AgentNotFound("x".into()).is_configuration());
        assert!(!AgentError::Provider("boom".into()).is_configuration());
        assert!(AgentError::ProviderUnavailable("down".into()).is_retryable());
        assert!(!AgentError::MaxIterations(5).is_retryable());
    }

    #[test]
    fn test_user_message_hides_internal_detail() {
        let err = AgentError::AgentFailed {
            agent: "files".into(),
            message: "stack trace here".into(),
        };
        assert!(!err.user_message().contains("stack trace"));
        assert!(err.user_message().contains("files"));
    }
}
