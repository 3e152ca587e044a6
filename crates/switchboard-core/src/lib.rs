//! # switchboard-core
//!
//! Multi-agent request routing with a pluggable tool system.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         TurnRunner                           │
//! │  ┌───────────────┐  ┌──────────────┐  ┌──────────────────┐   │
//! │  │ AgentRegistry │──│    Agent     │──│   Interpreter    │   │
//! │  │  (dispatch)   │  │  (LlmAgent)  │  │ (text -> calls)  │   │
//! │  └───────────────┘  └──────────────┘  └──────────────────┘   │
//! │          │                                     │             │
//! │  ┌───────────────┐                    ┌──────────────────┐   │
//! │  │   Observer /  │                    │   ToolRegistry   │   │
//! │  │  MetricsSink  │                    │ (validate + run) │   │
//! │  └───────────────┘                    └──────────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait keeps the transport out of the core; agents only
//! ever see a completion string, however malformed.

pub mod agent;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod interpreter;
pub mod llm_agent;
pub mod message;
pub mod observe;
pub mod provider;
pub mod tool;
pub mod turn;

pub use agent::{Agent, AgentDescriptor, AgentResponse};
pub use config::{DispatchConfig, TurnConfig};
pub use context::RequestContext;
pub use dispatcher::{AgentRegistry, AgentTask, DelegationChain};
pub use error::{AgentError, Result};
pub use interpreter::{Interpretation, ReasoningStep, ResponseInterpreter};
pub use llm_agent::{LlmAgent, LlmAgentBuilder, Routing};
pub use message::{Message, Role};
pub use observe::{DispatchObserver, InMemoryMetrics, MetricsSink, TracingObserver};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use tool::{
    ExportFormat, ParamType, ParameterSchema, ProvidedTool, Tool, ToolCall, ToolDefinition,
    ToolExecutor, ToolProvider, ToolRegistry, ToolResult, ValidationReport,
};
pub use turn::{TurnOutcome, TurnRunner};
