//! LLM-backed Agent
//!
//! The general-purpose concrete agent: builds a prompt, calls the provider,
//! runs the completion through the [`ResponseInterpreter`] and maps the
//! result into an [`AgentResponse`]. An `LlmAgent` may own tools, which makes
//! it a [`ToolProvider`] as well as a routing target.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, warn};

use crate::agent::{Agent, AgentDescriptor, AgentResponse};
use crate::context::{AGENT_KEY, RequestContext};
use crate::error::{AgentError, Result};
use crate::interpreter::{Interpretation, ResponseInterpreter};
use crate::message::Message;
use crate::provider::{GenerationOptions, LlmProvider};
use crate::tool::{ProvidedTool, Tool, ToolCall, ToolProvider, ToolRegistry};

const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant.

Think step by step. Structure your reply with these labels:
THOUGHT: your reasoning
TOOL: a JSON tool call, only if you need a tool
FINAL ANSWER: your answer to the user

Be concise and accurate.";

/// When an agent claims a request
#[derive(Clone, Debug)]
pub enum Routing {
    /// Claims everything (catch-all agents)
    Always,
    /// Claims requests mentioning any of these words (case-insensitive)
    Keywords(Vec<String>),
    /// Only reachable by explicit hand-off or by name
    Never,
}

impl Routing {
    fn matches(&self, input: &str) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Keywords(words) => {
                let input = input.to_lowercase();
                words.iter().any(|w| {
                    input
                        .split(|c: char| !c.is_alphanumeric() && c != '_')
                        .any(|token| token == w)
                })
            }
        }
    }
}

/// Agent configuration
#[derive(Clone, Debug)]
pub struct LlmAgentConfig {
    pub system_prompt: String,

    pub generation: GenerationOptions,

    /// Whether to append tool descriptions to system prompt
    pub inject_tool_descriptions: bool,

    /// Agents this one may hand off to, listed in the prompt
    pub peers: Vec<String>,
}

impl Default for LlmAgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            generation: GenerationOptions::default(),
            inject_tool_descriptions: true,
            peers: Vec::new(),
        }
    }
}

pub struct LlmAgent {
    descriptor: AgentDescriptor,
    provider: Arc<dyn LlmProvider>,
    interpreter: ResponseInterpreter,
    routing: Routing,
    tools: Vec<ProvidedTool>,
    /// Model-side tool names rewritten into this agent's vocabulary
    aliases: HashMap<String, String>,
    config: LlmAgentConfig,
}

impl LlmAgent {
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> LlmAgentBuilder {
        LlmAgentBuilder::new(name, description)
    }

    pub const fn config(&self) -> &LlmAgentConfig {
        &self.config
    }

    fn owns_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.definition.name == name)
    }

    fn build_system_prompt(&self, context: &RequestContext) -> String {
        let mut prompt = self.config.system_prompt.clone();

        let mut own = ToolRegistry::new();
        for tool in self.tools.iter().filter(|t| context.allows_tool(&t.definition.name)) {
            own.register(tool.definition.clone(), None);
        }
        if self.config.inject_tool_descriptions && !own.is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(&own.generate_prompt_section(&[]));
        }

        let others: Vec<&str> = context
            .available_tools
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(|t| !self.owns_tool(t))
            .collect();
        if !others.is_empty() {
            prompt.push_str(&format!("\nOther tools you may call: {}\n", others.join(", ")));
        }

        if !self.config.peers.is_empty() {
            prompt.push_str(&format!(
                "\nIf another agent is better suited, reply with `DELEGATE: <agent>`. Agents: {}\n",
                self.config.peers.join(", ")
            ));
        }

        prompt
    }

    fn build_messages(&self, context: &RequestContext) -> Vec<Message> {
        let mut messages = Vec::with_capacity(context.history.len() + 3);
        messages.push(Message::system(self.build_system_prompt(context)));
        messages.extend(context.history.iter().cloned());

        if let Some(previous) = context.previous_agent() {
            let note = match context.previous_message() {
                Some(said) => format!("Agent '{previous}' handed this request to you. It said: {said}"),
                None => format!("Agent '{previous}' handed this request to you."),
            };
            messages.push(Message::system(note));
        }

        messages.push(Message::user(&context.input));
        messages
    }

    /// Rewrite aliases, drop calls outside the vocabulary, assign ids
    fn map_tool_calls(&self, calls: Vec<ToolCall>, context: &RequestContext) -> Vec<ToolCall> {
        calls
            .into_iter()
            .filter_map(|mut call| {
                if let Some(canonical) = self.aliases.get(&call.tool) {
                    call.tool.clone_from(canonical);
                }
                let visible = if context.available_tools.is_some() {
                    context.has_tool(&call.tool)
                } else {
                    self.owns_tool(&call.tool)
                };
                if !visible {
                    warn!(agent = %self.descriptor.name, tool = %call.tool, "Dropping call to tool outside the request");
                    return None;
                }
                if call.id.is_none() {
                    call.id = Some(uuid::Uuid::new_v4().to_string());
                }
                Some(call)
            })
            .collect()
    }

    fn into_response(&self, interpretation: Interpretation, raw: &str, context: &RequestContext) -> AgentResponse {
        let steps = json!(interpretation.steps);
        let tool_calls = self.map_tool_calls(interpretation.tool_calls, context);
        let answer = interpretation.final_answer;

        let mut response = if !tool_calls.is_empty() {
            AgentResponse {
                message: Some(answer).filter(|a| !a.is_empty()),
                ..AgentResponse::tool_calls(tool_calls)
            }
        } else if !answer.is_empty() {
            AgentResponse::message(answer)
        } else {
            // Nothing recognisable: the raw text is the best we have
            AgentResponse::message(raw.trim())
        };

        if let Some(target) = interpretation
            .delegate_to
            .filter(|t| *t != self.descriptor.name)
        {
            response.next_agent = Some(target);
        }

        response
            .with_metadata(AGENT_KEY, json!(self.descriptor.name))
            .with_metadata("steps", steps)
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    async fn can_handle(&self, context: &RequestContext) -> Result<bool> {
        if context.delegation_target() == Some(self.descriptor.name.as_str()) {
            return Ok(true);
        }
        Ok(self.routing.matches(&context.input))
    }

    async fn process(&self, context: &RequestContext) -> Result<AgentResponse> {
        let messages = self.build_messages(context);
        debug!(agent = %self.descriptor.name, messages = messages.len(), "Calling provider");

        let completion = self
            .provider
            .complete(&messages, &self.config.generation)
            .await?;

        let interpretation = self.interpreter.interpret(&completion.content);
        if interpretation.is_empty() {
            debug!(agent = %self.descriptor.name, "Completion had no recognised structure");
        }

        Ok(self
            .into_response(interpretation, &completion.content, context)
            .with_metadata("model", json!(completion.model)))
    }

    fn tool_provider(&self) -> Option<&dyn ToolProvider> {
        if self.tools.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

impl ToolProvider for LlmAgent {
    fn provided_tools(&self) -> Vec<ProvidedTool> {
        self.tools.clone()
    }
}

/// Builder for [`LlmAgent`]
pub struct LlmAgentBuilder {
    descriptor: AgentDescriptor,
    provider: Option<Arc<dyn LlmProvider>>,
    interpreter: ResponseInterpreter,
    routing: Routing,
    tools: Vec<ProvidedTool>,
    aliases: HashMap<String, String>,
    config: LlmAgentConfig,
}

impl LlmAgentBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            descriptor: AgentDescriptor::new(name, description),
            provider: None,
            interpreter: ResponseInterpreter::new(),
            routing: Routing::Always,
            tools: Vec::new(),
            aliases: HashMap::new(),
            config: LlmAgentConfig::default(),
        }
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn interpreter(mut self, interpreter: ResponseInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    #[must_use]
    pub fn capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor = self.descriptor.capabilities(capabilities);
        self
    }

    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.descriptor = self.descriptor.priority(priority);
        self
    }

    #[must_use]
    pub fn routing(mut self, routing: Routing) -> Self {
        self.routing = routing;
        self
    }

    #[must_use]
    pub fn keywords<I, S>(self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self.routing(Routing::Keywords(words))
    }

    #[must_use]
    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(ProvidedTool::from_tool(tool));
        self
    }

    #[must_use]
    pub fn alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    #[must_use]
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    #[must_use]
    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    #[must_use]
    pub fn peers<I, S>(mut self, peers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.peers = peers.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> Result<LlmAgent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config(format!("Agent '{}' needs a provider", self.descriptor.name)))?;

        Ok(LlmAgent {
            descriptor: self.descriptor,
            provider,
            interpreter: self.interpreter,
            routing: self.routing,
            tools: self.tools,
            aliases: self.aliases,
            config: self.config,
        })
    }
}
