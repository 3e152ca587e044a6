//! Service Kit - Agent Tools
//!
//! Tools that implement `switchboard_core::Tool` for the bundled agents.

mod clock;
mod fs;
mod shell;

pub use clock::CurrentTimeTool;
pub use fs::{DEFAULT_MAX_BYTES, ListDirectoryTool, ReadFileTool, WriteFileTool};
pub use shell::{RunCommandTool, ShellConfig};

use serde_json::{Map, Value};

use crate::error::ToolError;

fn required_str<'a>(parameters: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    optional_str(parameters, name)
        .ok_or_else(|| ToolError::InvalidParameter(format!("'{name}' must be a string")))
}

fn optional_str<'a>(parameters: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    parameters.get(name).and_then(Value::as_str)
}
