//! Agent Registry / Dispatcher
//!
//! Owns the registered agents, picks the one that should handle a request,
//! runs it with instrumentation, and follows hand-offs between agents with
//! loop and depth protection.
//!
//! ```text
//! resolve ──► none ─────────────► "no suitable agent"
//!    │
//!    ├──► already in chain ─────► "processing loop detected"
//!    ├──► chain at max depth ───► "delegation chain too long"
//!    ▼
//! run agent ──► tool calls ─────► return (delegation ignored)
//!    │
//!    ├──► next_agent ───────────► layer provenance, resolve again
//!    ▼
//! return response
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, resume_unwind};
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::agent::{Agent, AgentDescriptor, AgentResponse};
use crate::config::DispatchConfig;
use crate::context::RequestContext;
use crate::error::{AgentError, Result};
use crate::observe::{DispatchObserver, InMemoryMetrics, MetricsSink, Phase, TracingObserver};
use crate::tool::{ToolRegistry, panic_message};

/// Message returned when no agent claims a request
pub const NO_AGENT_MESSAGE: &str = "No suitable agent found to handle this request.";

/// Metadata key recording how routing ended
pub const ROUTING_KEY: &str = "routing";

/// Metadata key holding the visited agents
pub const CHAIN_KEY: &str = "delegation_chain";

/// Agents visited while handling one top-level request.
///
/// Appending consumes the chain and returns the longer one, so a chain is
/// only ever extended by its current owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DelegationChain {
    agents: Vec<String>,
}

impl DelegationChain {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn push(mut self, agent: impl Into<String>) -> Self {
        self.agents.push(agent.into());
        self
    }

    pub fn contains(&self, agent: &str) -> bool {
        self.agents.iter().any(|a| a == agent)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.agents
    }
}

impl fmt::Display for DelegationChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.agents.join(" -> "))
    }
}

/// One entry for [`AgentRegistry::execute_multiple_agents`]
#[derive(Clone, Debug)]
pub struct AgentTask {
    pub agent: String,
    pub context: RequestContext,
}

impl AgentTask {
    pub fn new(agent: impl Into<String>, context: RequestContext) -> Self {
        Self {
            agent: agent.into(),
            context,
        }
    }
}

struct RegisteredAgent {
    agent: Arc<dyn Agent>,
    priority: i32,
}

/// Registry of agents and the dispatcher over them.
///
/// Eligible agents are ranked by descending priority. Equal priorities go to
/// the agent registered first; re-registering a name keeps its original slot.
pub struct AgentRegistry {
    agents: Vec<RegisteredAgent>,
    default_agent: Option<String>,
    max_chain_depth: usize,
    observer: Arc<dyn DispatchObserver>,
    metrics: Arc<dyn MetricsSink>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_config(&DispatchConfig::default())
    }

    /// Build an empty registry. `config.default_agent` is not applied here
    /// since the agent has to be registered first; see [`Self::apply_default`].
    pub fn with_config(config: &DispatchConfig) -> Self {
        Self {
            agents: Vec::new(),
            default_agent: None,
            max_chain_depth: config.max_chain_depth,
            observer: Arc::new(TracingObserver),
            metrics: Arc::new(InMemoryMetrics::new()),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register an agent at its declared priority
    pub fn register(&mut self, agent: Arc<dyn Agent>) {
        let priority = agent.descriptor().priority;
        self.register_with_priority(agent, priority);
    }

    /// Register an agent at an explicit priority, replacing any agent with
    /// the same name in place
    pub fn register_with_priority(&mut self, agent: Arc<dyn Agent>, priority: i32) {
        let name = agent.name().to_string();
        let entry = RegisteredAgent { agent, priority };

        match self.agents.iter_mut().find(|e| e.agent.name() == name) {
            Some(existing) => {
                warn!(agent = %name, priority, "Re-registering agent");
                *existing = entry;
            }
            None => {
                info!(agent = %name, priority, "Registered agent");
                self.agents.push(entry);
            }
        }
    }

    /// Set the fallback agent. The name must already be registered.
    pub fn set_default_agent(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_none() {
            return Err(AgentError::AgentNotFound(name.to_string()));
        }
        self.default_agent = Some(name.to_string());
        Ok(())
    }

    /// Apply `config.default_agent`, if any
    pub fn apply_default(&mut self, config: &DispatchConfig) -> Result<()> {
        match &config.default_agent {
            Some(name) => self.set_default_agent(name),
            None => Ok(()),
        }
    }

    pub fn default_agent(&self) -> Option<&str> {
        self.default_agent.as_deref()
    }

    pub const fn max_chain_depth(&self) -> usize {
        self.max_chain_depth
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .iter()
            .find(|e| e.agent.name() == name)
            .map(|e| Arc::clone(&e.agent))
    }

    /// Names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|e| e.agent.name()).collect()
    }

    /// Descriptors in registration order, with the effective priority
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents
            .iter()
            .map(|e| AgentDescriptor {
                priority: e.priority,
                ..e.agent.descriptor().clone()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Import the tools of every agent that is also a tool provider
    pub fn register_agent_tools(&self, tools: &mut ToolRegistry) -> usize {
        self.agents
            .iter()
            .filter_map(|e| e.agent.tool_provider().map(|p| (e.agent.name(), p)))
            .map(|(name, provider)| tools.register_provider(name, provider))
            .sum()
    }

    /// Pick the agent for a request.
    ///
    /// Every predicate is started before any is awaited. Among agents that
    /// answer true the highest priority wins, ties going to registration
    /// order. Falls back to the default agent, then to `None`. A failing
    /// predicate fails the lookup.
    pub async fn find_best_agent(&self, context: &RequestContext) -> Result<Option<Arc<dyn Agent>>> {
        let checks = self.agents.iter().map(|entry| async move {
            let outcome = entry.agent.can_handle(context).await;
            (entry, outcome)
        });
        let results = join_all(checks).await;

        let mut best: Option<&RegisteredAgent> = None;
        for (entry, outcome) in results {
            let eligible = outcome?;
            self.observer.observe_can_handle(entry.agent.name(), eligible);
            if eligible && best.is_none_or(|b| entry.priority > b.priority) {
                best = Some(entry);
            }
        }

        let chosen = match best {
            Some(entry) => Some(Arc::clone(&entry.agent)),
            None => self.default_agent.as_deref().and_then(|name| self.get(name)),
        };
        self.observer.observe_selection(chosen.as_ref().map(|a| a.name()));
        Ok(chosen)
    }

    /// An explicit hand-off target wins when it names a registered agent
    async fn resolve(&self, context: &RequestContext) -> Result<Option<Arc<dyn Agent>>> {
        if let Some(agent) = context.delegation_target().and_then(|name| self.get(name)) {
            self.observer.observe_selection(Some(agent.name()));
            return Ok(Some(agent));
        }
        self.find_best_agent(context).await
    }

    /// Run one agent's `pre_process -> process -> post_process`.
    ///
    /// Exactly one metrics record is written per call, success or failure.
    /// Errors are observed and then returned to the caller. A panicking agent
    /// is observed and recorded as a failure before the panic resumes.
    pub async fn process_with_agent(&self, name: &str, context: RequestContext) -> Result<AgentResponse> {
        let agent = self
            .get(name)
            .ok_or_else(|| AgentError::AgentNotFound(name.to_string()))?;

        let started = Instant::now();
        let outcome = match AssertUnwindSafe(self.run_lifecycle(agent.as_ref(), context))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => {
                let err = AgentError::AgentFailed {
                    agent: name.to_string(),
                    message: panic_message(payload.as_ref(), "agent panicked"),
                };
                self.observer.observe_error(name, &err);
                self.metrics.record_call(name, false, started.elapsed(), &[]);
                resume_unwind(payload);
            }
        };

        let (success, tools_used) = match &outcome {
            Ok(response) => (true, response.tools_used()),
            Err(err) => {
                self.observer.observe_error(name, err);
                (false, Vec::new())
            }
        };
        self.metrics
            .record_call(name, success, started.elapsed(), &tools_used);

        outcome
    }

    async fn run_lifecycle(&self, agent: &dyn Agent, context: RequestContext) -> Result<AgentResponse> {
        let name = agent.name();

        let phase_start = Instant::now();
        let context = agent.pre_process(context).await?;
        self.observer
            .observe_process(name, Phase::PreProcess, phase_start.elapsed());

        let phase_start = Instant::now();
        let response = agent.process(&context).await?;
        self.observer
            .observe_process(name, Phase::Process, phase_start.elapsed());

        let phase_start = Instant::now();
        let response = agent.post_process(response).await?;
        self.observer
            .observe_process(name, Phase::PostProcess, phase_start.elapsed());

        Ok(response)
    }

    /// Handle a top-level request
    pub async fn process(&self, context: RequestContext) -> Result<AgentResponse> {
        self.process_with_chain_protection(context, DelegationChain::new())
            .await
    }

    /// Dispatch `context`, following hand-offs until an agent answers, asks
    /// for tools, or routing has to stop.
    pub async fn process_with_chain_protection(
        &self,
        mut context: RequestContext,
        mut chain: DelegationChain,
    ) -> Result<AgentResponse> {
        loop {
            let Some(agent) = self.resolve(&context).await? else {
                info!(chain = %chain, "No agent claimed the request");
                return Ok(routing_stop(NO_AGENT_MESSAGE.to_string(), "no_agent", &chain));
            };
            let name = agent.name().to_string();

            if chain.contains(&name) {
                warn!(agent = %name, chain = %chain, "Delegation loop detected");
                let message = format!(
                    "Processing loop detected: agent '{name}' already handled this request ({chain})."
                );
                return Ok(routing_stop(message, "loop_detected", &chain));
            }

            if chain.len() >= self.max_chain_depth {
                warn!(agent = %name, chain = %chain, "Delegation chain too long");
                let message = format!(
                    "Delegation chain too long (limit {}): {chain} -> {name}.",
                    self.max_chain_depth
                );
                return Ok(routing_stop(message, "chain_too_long", &chain));
            }

            chain = chain.push(name.clone());
            info!(agent = %name, depth = chain.len(), "Dispatching");

            let response = self.process_with_agent(&name, context.clone()).await?;

            // Tool calls always win over delegation
            if response.has_tool_calls() || response.skip_further {
                return Ok(response);
            }

            let Some(next) = response.next_agent.clone() else {
                return Ok(response);
            };

            self.observer.observe_delegation(&name, &next, chain.len());
            context = context.delegated_from(&name, &response);
        }
    }

    /// Run a batch of named agent invocations, concurrently or in order.
    /// Results come back in task order either way; the first failure fails
    /// the batch.
    pub async fn execute_multiple_agents(&self, tasks: Vec<AgentTask>, parallel: bool) -> Result<Vec<AgentResponse>> {
        if parallel {
            let runs = tasks.into_iter().map(|task| async move {
                self.process_with_agent(&task.agent, task.context).await
            });
            return join_all(runs).await.into_iter().collect();
        }

        let mut responses = Vec::with_capacity(tasks.len());
        for task in tasks {
            responses.push(self.process_with_agent(&task.agent, task.context).await?);
        }
        Ok(responses)
    }
}

fn routing_stop(message: String, routing: &str, chain: &DelegationChain) -> AgentResponse {
    AgentResponse::message(message)
        .with_metadata(ROUTING_KEY, Value::String(routing.to_string()))
        .with_metadata(CHAIN_KEY, json!(chain.as_slice()))
}
