//! # switchboard-agents
//!
//! The agents switchboard ships with, and the tools they own.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  general (default) ── files ──── read_file           │
//! │                         │  ───── list_directory      │
//! │                         │  ───── write_file          │
//! │                       shell ──── run_command         │
//! │  (global)  current_time                              │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! File and shell tools are confined to one [`Workspace`] root.

pub mod agents;
pub mod error;
pub mod prompts;
pub mod svckit;
pub mod workspace;

pub use agents::{AgentSettings, Bundle, install};
pub use error::{Result, ToolError};
pub use workspace::Workspace;

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{
        CurrentTimeTool, ListDirectoryTool, ReadFileTool, RunCommandTool, ShellConfig,
        WriteFileTool,
    };
}
