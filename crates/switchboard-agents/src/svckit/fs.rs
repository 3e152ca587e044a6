//! File System Tools
//!
//! Read, list and write files under a [`Workspace`] root.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use switchboard_core::{
    RequestContext, Tool, ToolDefinition, ToolExecutor,
    tool::{ParamType, ParameterSchema},
};

use crate::error::ToolError;
use crate::svckit::{optional_str, required_str};
use crate::workspace::Workspace;

/// Largest read returned in one call unless the caller asks for less
pub const DEFAULT_MAX_BYTES: u64 = 64 * 1024;

const CATEGORY: &str = "filesystem";

pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub const fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolExecutor for ReadFileTool {
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        let requested = required_str(parameters, "path")?;
        let max_bytes = parameters
            .get("max_bytes")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let path = self.workspace.resolve(requested)?;
        if !path.is_file() {
            return Err(ToolError::NotFound(requested.to_string()).into());
        }

        let bytes = tokio::fs::read(&path).await?;
        let total = bytes.len();
        let limit = usize::try_from(max_bytes).unwrap_or(usize::MAX).min(total);
        let content = String::from_utf8_lossy(&bytes[..limit]).into_owned();

        debug!(path = %path.display(), total, "Read file");

        Ok(json!({
            "path": self.workspace.relative(&path),
            "content": content,
            "bytes": total,
            "truncated": limit < total,
        }))
    }
}

impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("read_file", "Read a text file from the workspace.")
            .param(ParameterSchema::string("path", "File path relative to the workspace root").required())
            .param(ParameterSchema::new(
                "max_bytes",
                ParamType::Integer,
                "Maximum number of bytes to return (default 65536)",
            ))
            .category(CATEGORY)
    }
}

#[derive(Debug, Serialize)]
struct Entry {
    name: String,
    kind: &'static str,
    size: u64,
}

pub struct ListDirectoryTool {
    workspace: Arc<Workspace>,
}

impl ListDirectoryTool {
    pub const fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolExecutor for ListDirectoryTool {
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        let requested = optional_str(parameters, "path").unwrap_or(".");
        let path = self.workspace.resolve(requested)?;
        if !path.is_dir() {
            return Err(ToolError::NotADirectory(requested.to_string()).into());
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = dir.next_entry().await? {
            let file_type = entry.file_type().await?;
            let kind = if file_type.is_symlink() {
                "symlink"
            } else if file_type.is_dir() {
                "dir"
            } else {
                "file"
            };
            let size = if file_type.is_file() {
                entry.metadata().await.map(|m| m.len()).unwrap_or(0)
            } else {
                0
            };
            entries.push(Entry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
                size,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(json!({
            "path": self.workspace.relative(&path),
            "entries": entries,
        }))
    }
}

impl Tool for ListDirectoryTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("list_directory", "List the entries of a workspace directory.")
            .param(ParameterSchema::string(
                "path",
                "Directory relative to the workspace root (default '.')",
            ))
            .category(CATEGORY)
    }
}

pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub const fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl ToolExecutor for WriteFileTool {
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        let requested = required_str(parameters, "path")?;
        let content = required_str(parameters, "content")?;
        let append = parameters
            .get("append")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let path = self.workspace.resolve(requested)?;
        if path.is_dir() {
            return Err(ToolError::InvalidParameter(format!("'{requested}' is a directory")).into());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), bytes = content.len(), append, "Wrote file");

        Ok(json!({
            "path": self.workspace.relative(&path),
            "bytes_written": content.len(),
            "appended": append,
        }))
    }
}

impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "write_file",
            "Write text to a workspace file, creating parent directories as needed.",
        )
        .param(ParameterSchema::string("path", "File path relative to the workspace root").required())
        .param(ParameterSchema::string("content", "Text to write").required())
        .param(ParameterSchema::new(
            "append",
            ParamType::Boolean,
            "Append instead of overwriting",
        ))
        .category(CATEGORY)
    }
}
