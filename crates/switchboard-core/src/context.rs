//! Request Context
//!
//! The value handed to every agent predicate and processing step. One is built
//! per top-level request; each delegation hop gets a copy with provenance
//! layered into its metadata.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::agent::AgentResponse;
use crate::message::Message;

/// Metadata key naming the agent that handed off
pub const PREVIOUS_AGENT_KEY: &str = "previous_agent";

/// Metadata key holding the handing-off agent's response
pub const PREVIOUS_RESPONSE_KEY: &str = "previous_response";

/// Metadata key naming the agent the previous hop asked for
pub const DELEGATION_TARGET_KEY: &str = "delegation_target";

/// Response metadata key naming the agent that produced the response
pub const AGENT_KEY: &str = "agent";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// The user's request text
    pub input: String,

    /// Prior conversation, oldest first
    #[serde(default)]
    pub history: Vec<Message>,

    /// Tool names visible to this request. `None` leaves the choice to the
    /// runner; an empty list hides every tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_tools: Option<Vec<String>>,

    /// Open-ended metadata (delegation provenance lives here)
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl RequestContext {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.available_tools = Some(tools.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Build the context for the next delegation hop.
    ///
    /// The copy keeps input, history and tools, and records who handed off,
    /// what they answered and whom they asked for.
    pub fn delegated_from(&self, agent: &str, response: &AgentResponse) -> Self {
        let mut next = self.clone();
        next.metadata
            .insert(PREVIOUS_AGENT_KEY.into(), Value::String(agent.to_string()));
        next.metadata.insert(
            PREVIOUS_RESPONSE_KEY.into(),
            serde_json::to_value(response).unwrap_or(Value::Null),
        );
        match &response.next_agent {
            Some(target) => {
                next.metadata
                    .insert(DELEGATION_TARGET_KEY.into(), Value::String(target.clone()));
            }
            None => {
                next.metadata.remove(DELEGATION_TARGET_KEY);
            }
        }
        next
    }

    pub fn previous_agent(&self) -> Option<&str> {
        self.metadata.get(PREVIOUS_AGENT_KEY).and_then(Value::as_str)
    }

    /// The message text of the previous hop, if it produced one
    pub fn previous_message(&self) -> Option<&str> {
        self.metadata
            .get(PREVIOUS_RESPONSE_KEY)
            .and_then(|r| r.get("message"))
            .and_then(Value::as_str)
    }

    /// Route the next dispatch of this context straight to `agent`
    pub fn set_delegation_target(&mut self, agent: &str) {
        self.metadata
            .insert(DELEGATION_TARGET_KEY.into(), Value::String(agent.to_string()));
    }

    pub fn delegation_target(&self) -> Option<&str> {
        self.metadata.get(DELEGATION_TARGET_KEY).and_then(Value::as_str)
    }

    /// True when the request explicitly names `name`
    pub fn has_tool(&self, name: &str) -> bool {
        self.available_tools
            .as_ref()
            .is_some_and(|tools| tools.iter().any(|t| t == name))
    }

    /// True unless the request restricts tools and `name` is not among them
    pub fn allows_tool(&self, name: &str) -> bool {
        self.available_tools.is_none() || self.has_tool(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delegated_context_carries_provenance() {
        let ctx = RequestContext::new("summarize the readme")
            .with_tools(["read_file"])
            .with_metadata("channel", Value::String("http".into()));

        let response = AgentResponse::message("I can't read files").delegate_to("files");
        let next = ctx.delegated_from("general", &response);

        assert_eq!(next.input, ctx.input);
        assert_eq!(next.previous_agent(), Some("general"));
        assert_eq!(next.previous_message(), Some("I can't read files"));
        assert_eq!(next.delegation_target(), Some("files"));
        assert_eq!(next.metadata["channel"], "http");
        assert!(next.has_tool("read_file"));

        // original is untouched
        assert!(ctx.previous_agent().is_none());
    }

    #[test]
    fn test_unspecified_and_empty_tool_lists_differ() {
        let open = RequestContext::new("hi");
        assert!(open.allows_tool("write_file"));
        assert!(!open.has_tool("write_file"));

        let closed = RequestContext::new("hi").with_tools(Vec::<String>::new());
        assert!(!closed.allows_tool("write_file"));

        let some = RequestContext::new("hi").with_tools(["read_file"]);
        assert!(some.allows_tool("read_file"));
        assert!(!some.allows_tool("write_file"));
    }
}
