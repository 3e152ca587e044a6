//! Clock Tool

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use switchboard_core::{RequestContext, Tool, ToolDefinition, ToolExecutor};

/// Current time in UTC. Shared by every agent.
#[derive(Debug, Default)]
pub struct CurrentTimeTool;

#[async_trait]
impl ToolExecutor for CurrentTimeTool {
    async fn execute(
        &self,
        _parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        let now = Utc::now();
        Ok(json!({
            "utc": now.to_rfc3339_opts(SecondsFormat::Secs, true),
            "unix": now.timestamp(),
            "weekday": now.format("%A").to_string(),
        }))
    }
}

impl Tool for CurrentTimeTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new("current_time", "Get the current date and time (UTC).").category("utility")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reports_utc() {
        let out = CurrentTimeTool.execute(&Map::new(), None).await.unwrap();
        assert!(out["utc"].as_str().unwrap().ends_with('Z'));
        assert!(out["unix"].as_i64().unwrap() > 1_600_000_000);
        assert_eq!(CurrentTimeTool.definition().name, "current_time");
    }
}
