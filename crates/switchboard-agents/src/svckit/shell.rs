//! Shell Tool
//!
//! Runs a program inside the workspace root. No shell is involved: the
//! program and its arguments are passed straight to the OS.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::{info, warn};

use switchboard_core::{
    RequestContext, Tool, ToolDefinition, ToolExecutor,
    tool::{ParamType, ParameterSchema},
};

use crate::error::ToolError;
use crate::svckit::required_str;
use crate::workspace::Workspace;

/// Output kept per stream
const MAX_OUTPUT_CHARS: usize = 16 * 1024;

#[derive(Clone, Debug, Deserialize)]
pub struct ShellConfig {
    /// Default timeout when the call doesn't specify one
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Upper bound for caller-supplied timeouts
    #[serde(default = "default_max_timeout_secs")]
    pub max_timeout_secs: u64,

    /// Programs that may run. Empty allows anything.
    #[serde(default)]
    pub allowed_commands: Vec<String>,
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_timeout_secs() -> u64 {
    300
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_max_timeout_secs(),
            allowed_commands: Vec::new(),
        }
    }
}

impl ShellConfig {
    /// Reads `SWITCHBOARD_SHELL_TIMEOUT_SECS` and the comma-separated
    /// `SWITCHBOARD_SHELL_ALLOW`
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeout_secs = std::env::var("SWITCHBOARD_SHELL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.timeout_secs);
        let allowed_commands = std::env::var("SWITCHBOARD_SHELL_ALLOW")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            timeout_secs,
            allowed_commands,
            ..defaults
        }
    }

    fn allows(&self, program: &str) -> bool {
        self.allowed_commands.is_empty() || self.allowed_commands.iter().any(|c| c == program)
    }
}

pub struct RunCommandTool {
    workspace: Arc<Workspace>,
    config: ShellConfig,
}

impl RunCommandTool {
    pub const fn new(workspace: Arc<Workspace>, config: ShellConfig) -> Self {
        Self { workspace, config }
    }
}

fn string_args(parameters: &Map<String, Value>) -> Result<Vec<String>, ToolError> {
    match parameters.get("args") {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                Value::Bool(b) => Ok(b.to_string()),
                _ => Err(ToolError::InvalidParameter("'args' must hold scalars".into())),
            })
            .collect(),
        Some(_) => Err(ToolError::InvalidParameter("'args' must be an array".into())),
    }
}

fn clip(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    if text.chars().count() > MAX_OUTPUT_CHARS {
        let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
        format!("{kept}\n[output truncated]")
    } else {
        text.into_owned()
    }
}

#[async_trait]
impl ToolExecutor for RunCommandTool {
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        let program = required_str(parameters, "command")?.trim();
        if program.is_empty() {
            return Err(ToolError::InvalidParameter("'command' is empty".into()).into());
        }
        if !self.config.allows(program) {
            warn!(program, "Blocked command");
            return Err(ToolError::CommandNotAllowed(program.to_string()).into());
        }
        let args = string_args(parameters)?;
        let secs = parameters
            .get("timeout_secs")
            .and_then(Value::as_u64)
            .unwrap_or(self.config.timeout_secs)
            .min(self.config.max_timeout_secs);

        info!(program, ?args, timeout_secs = secs, "Running command");

        let child = Command::new(program)
            .args(&args)
            .current_dir(self.workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(Duration::from_secs(secs), child.wait_with_output())
            .await
            .map_err(|_| ToolError::Timeout {
                command: program.to_string(),
                secs,
            })??;

        Ok(json!({
            "command": program,
            "args": args,
            "exit_code": output.status.code(),
            "success": output.status.success(),
            "stdout": clip(&output.stdout),
            "stderr": clip(&output.stderr),
        }))
    }
}

impl Tool for RunCommandTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "run_command",
            "Run a program in the workspace directory and capture its output. No shell syntax.",
        )
        .param(ParameterSchema::string("command", "Program to run, e.g. 'ls'").required())
        .param(ParameterSchema::new("args", ParamType::Array, "Arguments passed to the program"))
        .param(ParameterSchema::new(
            "timeout_secs",
            ParamType::Integer,
            "Seconds before the program is killed",
        ))
        .category("shell")
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn tool(config: ShellConfig) -> (tempfile::TempDir, RunCommandTool) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Arc::new(Workspace::open(dir.path()).unwrap());
        (dir, RunCommandTool::new(ws, config))
    }

    #[tokio::test]
    async fn test_runs_in_workspace() {
        let (dir, tool) = tool(ShellConfig::default());
        std::fs::write(dir.path().join("marker.txt"), "").unwrap();

        let out = tool
            .execute(&params(json!({"command": "ls"})), None)
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["exit_code"], 0);
        assert!(out["stdout"].as_str().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_output() {
        let (_dir, tool) = tool(ShellConfig::default());
        let out = tool
            .execute(&params(json!({"command": "sh", "args": ["-c", "echo oops >&2; exit 3"]})), None)
            .await
            .unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["exit_code"], 3);
        assert_eq!(out["stderr"], "oops\n");
    }

    #[tokio::test]
    async fn test_timeout() {
        let (_dir, tool) = tool(ShellConfig::default());
        let err = tool
            .execute(&params(json!({"command": "sleep", "args": [5], "timeout_secs": 1})), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out after 1s"));
    }

    #[tokio::test]
    async fn test_allow_list() {
        let (_dir, tool) = tool(ShellConfig {
            allowed_commands: vec!["echo".into()],
            ..Default::default()
        });

        let err = tool
            .execute(&params(json!({"command": "rm", "args": ["-rf", "."]})), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Command not allowed: rm"));

        let out = tool
            .execute(&params(json!({"command": "echo", "args": ["hi"]})), None)
            .await
            .unwrap();
        assert_eq!(out["stdout"], "hi\n");
    }

    #[tokio::test]
    async fn test_rejects_bad_args() {
        let (_dir, tool) = tool(ShellConfig::default());
        let err = tool
            .execute(&params(json!({"command": "echo", "args": "hi"})), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("'args' must be an array"));
    }
}
