//! Turn Runner
//!
//! Drives one user turn end to end: dispatch, run any requested tools
//! through the registry, feed the observations back, dispatch again. Stops at
//! the first response without tool calls.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentResponse;
use crate::config::TurnConfig;
use crate::context::{AGENT_KEY, RequestContext};
use crate::dispatcher::AgentRegistry;
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::tool::{ToolCall, ToolRegistry, ToolResult};

/// Input used for the rounds after tools have run
pub const CONTINUE_PROMPT: &str =
    "Continue with the original request using the tool results above.";

/// Everything that happened during one turn
#[derive(Clone, Debug, Serialize)]
pub struct TurnOutcome {
    /// The final (tool-free) response
    pub response: AgentResponse,

    /// Every tool result, in execution order
    pub tool_results: Vec<ToolResult>,

    /// History including this turn's exchange
    pub history: Vec<Message>,

    /// Dispatch rounds used
    pub rounds: usize,
}

pub struct TurnRunner {
    agents: Arc<AgentRegistry>,
    tools: Arc<ToolRegistry>,
    config: TurnConfig,
}

impl TurnRunner {
    pub const fn new(agents: Arc<AgentRegistry>, tools: Arc<ToolRegistry>, config: TurnConfig) -> Self {
        Self {
            agents,
            tools,
            config,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn. A request that leaves `available_tools` unset sees every
    /// registered tool; an explicit list (even an empty one) is kept as is.
    pub async fn run(&self, mut context: RequestContext) -> Result<TurnOutcome> {
        if context.available_tools.is_none() {
            context.available_tools = Some(self.tools.names().into_iter().map(String::from).collect());
        }

        let original_input = context.input.clone();
        let mut tool_results = Vec::new();

        for round in 1..=self.config.max_tool_rounds {
            let response = self.agents.process(context.clone()).await?;

            if !response.has_tool_calls() {
                info!(rounds = round, tools = tool_results.len(), "Turn complete");
                if round == 1 {
                    context.history.push(Message::user(&original_input));
                }
                if let Some(message) = &response.message {
                    context.history.push(Message::assistant(message));
                }
                return Ok(TurnOutcome {
                    response,
                    tool_results,
                    history: context.history,
                    rounds: round,
                });
            }

            if round == 1 {
                context.history.push(Message::user(&original_input));
            }
            // Observations go back to whoever asked for them
            if let Some(agent) = response
                .metadata
                .as_ref()
                .and_then(|m| m.get(AGENT_KEY))
                .and_then(Value::as_str)
            {
                context.set_delegation_target(agent);
            }
            context
                .history
                .push(Message::assistant(describe_calls(&response.tool_calls)));

            for call in &response.tool_calls {
                let result = self.execute(call, &context).await;
                debug!(tool = %call.tool, success = result.success, "Tool round result");
                context
                    .history
                    .push(Message::tool(result.render(), result.id.clone()));
                tool_results.push(result);
            }

            context.input = CONTINUE_PROMPT.to_string();
        }

        Err(AgentError::MaxIterations(self.config.max_tool_rounds))
    }

    /// Check visibility, validate (if configured) then execute. Always yields a result.
    async fn execute(&self, call: &ToolCall, context: &RequestContext) -> ToolResult {
        if !context.allows_tool(&call.tool) {
            warn!(tool = %call.tool, "Refusing tool outside the request");
            return ToolResult::failure(
                &call.tool,
                format!("tool '{}' is not available for this request", call.tool),
            )
            .for_call(call);
        }
        if self.config.validate_tool_calls {
            let report = self.tools.validate_tool_call(call);
            if !report.valid {
                return ToolResult::failure(&call.tool, report.errors.join("; ")).for_call(call);
            }
        }
        self.tools.execute_tool(call, Some(context)).await
    }
}

fn describe_calls(calls: &[ToolCall]) -> String {
    calls
        .iter()
        .map(|call| {
            format!(
                "TOOL: {}",
                serde_json::to_string(call).unwrap_or_else(|_| call.tool.clone())
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::agent::{Agent, AgentDescriptor};
    use crate::message::Role;
    use crate::tool::{ParameterSchema, ToolDefinition, executor_fn};

    /// Asks for `call` until a tool message shows up in history
    struct ToolUser {
        descriptor: AgentDescriptor,
        call: ToolCall,
        stubborn: bool,
    }

    #[async_trait]
    impl Agent for ToolUser {
        fn descriptor(&self) -> &AgentDescriptor {
            &self.descriptor
        }

        async fn can_handle(&self, _context: &RequestContext) -> Result<bool> {
            Ok(true)
        }

        async fn process(&self, context: &RequestContext) -> Result<AgentResponse> {
            let observed = context.history.iter().rev().find(|m| m.role == Role::Tool);
            match observed {
                Some(message) if !self.stubborn => {
                    Ok(AgentResponse::message(format!("done: {}", message.content)))
                }
                _ => Ok(AgentResponse::tool_calls(vec![self.call.clone()])),
            }
        }
    }

    fn runner(call: ToolCall, stubborn: bool) -> TurnRunner {
        let mut agents = AgentRegistry::new();
        agents.register(Arc::new(ToolUser {
            descriptor: AgentDescriptor::new("tool_user", "uses tools"),
            call,
            stubborn,
        }));

        let mut tools = ToolRegistry::new();
        tools.register(
            ToolDefinition::new("shout", "Upper-case text")
                .param(ParameterSchema::string("text", "Input").required()),
            Some(executor_fn(|params| async move {
                let text = params["text"].as_str().unwrap_or_default().to_uppercase();
                Ok::<_, anyhow::Error>(json!(text))
            })),
        );

        TurnRunner::new(Arc::new(agents), Arc::new(tools), TurnConfig::default())
    }

    #[tokio::test]
    async fn test_tool_round_then_answer() {
        let call = ToolCall::new("shout").with_param("text", json!("hey")).with_id("c1");
        let outcome = runner(call, false).run(RequestContext::new("shout hey")).await.unwrap();

        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.tool_results.len(), 1);
        assert_eq!(outcome.tool_results[0].output, Some(json!("HEY")));
        assert_eq!(outcome.tool_results[0].id.as_deref(), Some("c1"));
        assert!(outcome.response.message.unwrap().contains("HEY"));

        let roles: Vec<Role> = outcome.history.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(outcome.history[0].content, "shout hey");
    }

    #[tokio::test]
    async fn test_invalid_call_reported_to_model() {
        let call = ToolCall::new("shout").with_param("loud", json!(true));
        let outcome = runner(call, false).run(RequestContext::new("shout")).await.unwrap();

        let result = &outcome.tool_results[0];
        assert!(result.is_error);
        let error = result.error.as_deref().unwrap();
        assert!(error.contains("missing required parameter: text"));
        assert!(error.contains("unknown parameter: loud"));
    }

    #[tokio::test]
    async fn test_call_outside_visible_tools_refused() {
        let call = ToolCall::new("shout").with_param("text", json!("hey"));
        let ctx = RequestContext::new("shout hey").with_tools(["whisper"]);
        let outcome = runner(call, false).run(ctx).await.unwrap();

        let result = &outcome.tool_results[0];
        assert!(!result.success);
        assert!(result.output.is_none());
        assert!(
            result
                .error
                .as_deref()
                .unwrap()
                .contains("tool 'shout' is not available for this request")
        );
    }

    #[tokio::test]
    async fn test_empty_tool_list_hides_everything() {
        let call = ToolCall::new("shout").with_param("text", json!("hey"));
        let ctx = RequestContext::new("shout hey").with_tools(Vec::<String>::new());
        let outcome = runner(call, false).run(ctx).await.unwrap();

        assert!(!outcome.tool_results[0].success);
        assert!(outcome.response.message.unwrap().contains("not available"));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_rounds() {
        let call = ToolCall::new("shout").with_param("text", json!("again"));
        let err = runner(call, true).run(RequestContext::new("loop")).await.unwrap_err();
        assert!(matches!(err, AgentError::MaxIterations(5)));
    }
}
