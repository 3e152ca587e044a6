//! Error Types for workspace tools

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Path escapes the workspace: {0}")]
    OutsideWorkspace(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Command not allowed: {0}")]
    CommandNotAllowed(String),

    #[error("Command '{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
