//! HTTP Handlers

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use switchboard_core::{
    AgentDescriptor, AgentError, ExportFormat, RequestContext, ToolCall, ToolResult,
    ValidationReport,
    context::AGENT_KEY,
    dispatcher::{CHAIN_KEY, ROUTING_KEY},
    observe::AgentStats,
    provider::ModelInfo,
};

use crate::state::AppState;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, error) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Self::Agent(err @ AgentError::AgentNotFound(_)) => {
                (StatusCode::NOT_FOUND, "AGENT_NOT_FOUND", err.user_message())
            }
            Self::Agent(err @ AgentError::ToolNotFound(_)) => {
                (StatusCode::NOT_FOUND, "TOOL_NOT_FOUND", err.user_message())
            }
            Self::Agent(err) if err.is_configuration() => {
                (StatusCode::BAD_REQUEST, "CONFIGURATION", err.user_message())
            }
            Self::Agent(err) if err.is_retryable() => {
                (StatusCode::SERVICE_UNAVAILABLE, "PROVIDER_UNAVAILABLE", err.user_message())
            }
            Self::Agent(err) => {
                tracing::error!("Agent error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "AGENT_ERROR", err.user_message())
            }
        };

        (
            status,
            Json(ErrorResponse {
                error,
                code: code.into(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub provider: String,
    pub provider_connected: bool,
    pub agents: usize,
    pub tools: usize,
    pub conversations: usize,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,

    /// Continue an earlier conversation
    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Send the turn straight to this agent instead of routing it
    #[serde(default)]
    pub agent: Option<String>,

    /// Restrict the tools agents may call. Omitted means every tool; an
    /// empty list means none.
    #[serde(default)]
    pub tools: Option<Vec<String>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,

    /// Agent that produced the final message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Set when routing stopped early (`no_agent`, `loop_detected`, `chain_too_long`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routing: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delegation_chain: Vec<String>,

    #[serde(default)]
    pub tool_results: Vec<ToolResult>,

    pub rounds: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolsQuery {
    #[serde(default)]
    pub format: ExportFormat,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub default_agent: Option<String>,
    pub max_chain_depth: usize,
    pub agents: Vec<AgentDescriptor>,
}

#[derive(Debug, Serialize)]
pub struct ToolsResponse {
    pub format: ExportFormat,
    pub tools: Vec<Value>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        provider: state.provider.name().into(),
        provider_connected,
        agents: state.runner.agents().len(),
        tools: state.runner.tools().len(),
        conversations: state.conversations.len().await,
    })
}

/// Models the provider can serve
pub async fn list_models(State(state): State<AppState>) -> Result<Json<Vec<ModelInfo>>, ApiError> {
    Ok(Json(state.provider.list_models().await?))
}

/// Registered agents in registration order
pub async fn list_agents(State(state): State<AppState>) -> Json<AgentsResponse> {
    let agents = state.runner.agents();
    Json(AgentsResponse {
        default_agent: agents.default_agent().map(String::from),
        max_chain_depth: agents.max_chain_depth(),
        agents: agents.descriptors(),
    })
}

/// Tool definitions in the requested vendor format
pub async fn list_tools(
    State(state): State<AppState>,
    Query(query): Query<ToolsQuery>,
) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        format: query.format,
        tools: state.runner.tools().export(query.format),
    })
}

/// Check a tool call against its schema without running it
pub async fn validate_tool(
    State(state): State<AppState>,
    Json(call): Json<ToolCall>,
) -> Result<Json<ValidationReport>, ApiError> {
    let tools = state.runner.tools();
    tools.require(&call.tool)?;
    Ok(Json(tools.validate_tool_call(&call)))
}

/// Per-agent call statistics
pub async fn metrics(State(state): State<AppState>) -> Json<BTreeMap<String, AgentStats>> {
    Json(state.metrics.snapshot())
}

/// Run one user turn
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message must not be empty".into()));
    }

    let conversation_id = payload
        .conversation_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let history = state.conversations.history(&conversation_id).await;
    let known = history.len();

    let mut context = RequestContext::new(payload.message).with_history(history);
    if let Some(tools) = payload.tools {
        context = context.with_tools(tools);
    }
    if let Some(agent) = &payload.agent {
        if state.runner.agents().get(agent).is_none() {
            return Err(AgentError::AgentNotFound(agent.clone()).into());
        }
        context.set_delegation_target(agent);
    }

    let mut outcome = state.runner.run(context).await?;

    let turn = outcome.history.split_off(known.min(outcome.history.len()));
    state.conversations.append(&conversation_id, turn).await;

    let response = outcome.response;
    let metadata = response.metadata.unwrap_or_default();
    let text_field = |key: &str| metadata.get(key).and_then(Value::as_str).map(String::from);

    Ok(Json(ChatResponse {
        message: response.message.unwrap_or_default(),
        conversation_id,
        agent: text_field(AGENT_KEY),
        routing: text_field(ROUTING_KEY),
        delegation_chain: metadata
            .get(CHAIN_KEY)
            .and_then(|chain| serde_json::from_value(chain.clone()).ok())
            .unwrap_or_default(),
        tool_results: outcome.tool_results,
        rounds: outcome.rounds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::{
        Router,
        body::{Body, to_bytes},
        http::{Request, header},
    };
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use switchboard_agents::{AgentSettings, Workspace, install, tools::ShellConfig};
    use switchboard_core::{
        AgentRegistry, DispatchConfig, InMemoryMetrics, LlmProvider, TurnConfig, TurnRunner,
    };
    use switchboard_runtime::StaticProvider;
    use tower::ServiceExt;

    fn app(provider: StaticProvider) -> Router {
        crate::router(state(provider))
    }

    fn state(provider: StaticProvider) -> AppState {
        let provider: Arc<dyn LlmProvider> = Arc::new(provider);
        let settings = AgentSettings {
            model: "test-model".into(),
            workspace: Arc::new(Workspace::open(std::env::temp_dir()).unwrap()),
            shell: ShellConfig::default(),
        };
        let metrics = Arc::new(InMemoryMetrics::new());
        let registry = AgentRegistry::new().with_metrics(metrics.clone());
        let bundle = install(registry, &provider, &settings, &DispatchConfig::default()).unwrap();
        let runner = TurnRunner::new(
            Arc::new(bundle.agents),
            Arc::new(bundle.tools),
            TurnConfig::default(),
        );
        AppState::new(provider, runner, metrics)
    }

    async fn send<T: DeserializeOwned>(app: Router, request: Request<Body>) -> (StatusCode, T) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body): (_, HealthResponse) = send(app(StaticProvider::echo()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.provider, "static");
        assert!(body.provider_connected);
        assert_eq!(body.agents, 3);
        assert_eq!(body.tools, 5);
        assert_eq!(body.conversations, 0);
    }

    #[tokio::test]
    async fn test_agents_listing() {
        let (_, body): (_, AgentsResponse) = send(app(StaticProvider::echo()), get("/api/agents")).await;
        assert_eq!(body.default_agent.as_deref(), Some("general"));
        let names: Vec<_> = body.agents.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["general", "files", "shell"]);
    }

    #[tokio::test]
    async fn test_tools_formats() {
        let (_, body): (_, Value) = send(app(StaticProvider::echo()), get("/api/tools")).await;
        assert_eq!(body["format"], "function");
        assert_eq!(body["tools"][0]["type"], "function");

        let (_, body): (_, Value) =
            send(app(StaticProvider::echo()), get("/api/tools?format=input_schema")).await;
        assert_eq!(body["format"], "input_schema");
        assert!(body["tools"][0]["input_schema"].is_object());
    }

    #[tokio::test]
    async fn test_validate_tool() {
        let call = json!({"tool": "read_file", "parameters": {"max_bytes": "lots"}});
        let (_, report): (_, ValidationReport) =
            send(app(StaticProvider::echo()), post("/api/tools/validate", &call)).await;
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e == "missing required parameter: path"));
    }

    #[tokio::test]
    async fn test_chat_echo_and_metrics() {
        let app = app(StaticProvider::echo());
        let (status, body): (_, ChatResponse) = send(
            app.clone(),
            post("/api/chat", &json!({"message": "hello there"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.message, "hello there");
        assert_eq!(body.agent.as_deref(), Some("general"));
        assert_eq!(body.rounds, 1);

        let (_, stats): (_, Value) = send(app, get("/api/metrics")).await;
        assert_eq!(stats["general"]["calls"], 1);
    }

    #[tokio::test]
    async fn test_chat_forced_agent() {
        let app = app(StaticProvider::new(["FINAL ANSWER: shell here"]));

        let (_, body): (_, ChatResponse) = send(
            app.clone(),
            post("/api/chat", &json!({"message": "hi", "agent": "shell"})),
        )
        .await;
        assert_eq!(body.agent.as_deref(), Some("shell"));
        assert_eq!(body.message, "shell here");

        let (status, err): (_, ErrorResponse) = send(
            app,
            post("/api/chat", &json!({"message": "hi", "agent": "nobody"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "AGENT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_validate_unknown_tool_not_found() {
        let call = json!({"tool": "format_disk", "parameters": {}});
        let (status, err): (_, ErrorResponse) =
            send(app(StaticProvider::echo()), post("/api/tools/validate", &call)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "TOOL_NOT_FOUND");
        assert!(err.error.contains("format_disk"));
    }

    #[test]
    fn test_configuration_errors_are_client_errors() {
        let response = ApiError::from(AgentError::Config("bad".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_tool_list_unset_versus_empty() {
        let replies = || StaticProvider::new([r#"TOOL: {"tool": "current_time", "parameters": {}}"#, "FINAL ANSWER: done"]);

        let (_, open): (_, ChatResponse) = send(
            app(replies()),
            post("/api/chat", &json!({"message": "what time is it"})),
        )
        .await;
        assert_eq!(open.rounds, 2);
        assert_eq!(open.tool_results.len(), 1);
        assert!(open.tool_results[0].success);

        let (_, closed): (_, ChatResponse) = send(
            app(replies()),
            post("/api/chat", &json!({"message": "what time is it", "tools": []})),
        )
        .await;
        assert_eq!(closed.rounds, 1);
        assert!(closed.tool_results.is_empty());

        let (_, other): (_, ChatResponse) = send(
            app(replies()),
            post("/api/chat", &json!({"message": "what time is it", "tools": ["read_file"]})),
        )
        .await;
        assert!(other.tool_results.is_empty());
    }

    #[tokio::test]
    async fn test_chat_history_accumulates_per_conversation() {
        let state = state(StaticProvider::echo());
        let app = crate::router(state.clone());
        let (_, first): (_, ChatResponse) =
            send(app.clone(), post("/api/chat", &json!({"message": "first"}))).await;
        let id = first.conversation_id;

        let (_, _second): (_, ChatResponse) = send(
            app,
            post("/api/chat", &json!({"message": "second", "conversation_id": id})),
        )
        .await;

        let history = state.conversations.history(&id).await;
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["first", "first", "second", "second"]);
    }

    #[tokio::test]
    async fn test_chat_rejects_empty_message() {
        let (status, err): (_, ErrorResponse) =
            send(app(StaticProvider::echo()), post("/api/chat", &json!({"message": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "BAD_REQUEST");
    }
}
