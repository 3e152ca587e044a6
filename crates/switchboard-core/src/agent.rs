//! Agent Abstraction
//!
//! An agent owns a narrow slice of intents. The dispatcher asks every agent
//! whether it can handle a request (concurrently), picks one, and runs its
//! `pre_process -> process -> post_process` lifecycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::context::RequestContext;
use crate::error::Result;
use crate::tool::{ToolCall, ToolProvider};

/// Static identity of an agent
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentDescriptor {
    /// Unique registry key
    pub name: String,

    pub description: String,

    /// Capability tags, e.g. `files`, `shell`
    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Tie-breaker among eligible agents; higher wins
    #[serde(default)]
    pub priority: i32,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            priority: 0,
        }
    }

    #[must_use]
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Result of one agent invocation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Final message text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Tool invocations to run. When non-empty, delegation is ignored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,

    /// Agent to hand off to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_agent: Option<String>,

    /// Stop considering further agents for this request
    #[serde(default)]
    pub skip_further: bool,
}

impl AgentResponse {
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            message: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn delegate_to(mut self, agent: impl Into<String>) -> Self {
        self.next_agent = Some(agent.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(Map::new)
            .insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn skip_further(mut self) -> Self {
        self.skip_further = true;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Names of the tools this response asks for, in order
    pub fn tools_used(&self) -> Vec<String> {
        self.tool_calls.iter().map(|c| c.tool.clone()).collect()
    }
}

/// Agent trait - implement to add a new router target
#[async_trait]
pub trait Agent: Send + Sync {
    fn descriptor(&self) -> &AgentDescriptor;

    fn name(&self) -> &str {
        &self.descriptor().name
    }

    /// Eligibility predicate. Must be side-effect free: it is evaluated
    /// concurrently with every other agent's predicate.
    async fn can_handle(&self, context: &RequestContext) -> Result<bool>;

    /// Do the agent's work
    async fn process(&self, context: &RequestContext) -> Result<AgentResponse>;

    async fn pre_process(&self, context: RequestContext) -> Result<RequestContext> {
        Ok(context)
    }

    async fn post_process(&self, response: AgentResponse) -> Result<AgentResponse> {
        Ok(response)
    }

    /// Tools this agent owns, if it is also a tool provider
    fn tool_provider(&self) -> Option<&dyn ToolProvider> {
        None
    }
}
