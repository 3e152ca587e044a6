//! Tool System
//!
//! Declarative tool definitions, the executors that run them, and the
//! registry that validates and executes calls. Definitions and executors are
//! registered independently: a definition without an executor is
//! descriptive-only, it can be shown to the model but not run.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::context::RequestContext;
use crate::error::{AgentError, Result};

/// Tool call request from the LLM
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub tool: String,

    /// Arguments as key-value pairs
    #[serde(default)]
    pub parameters: Map<String, Value>,

    /// Optional correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            parameters: Map::new(),
            id: None,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Read a string parameter
    pub fn str_param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).and_then(Value::as_str)
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool that was called
    pub tool: String,

    /// Call id (if provided in request)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub success: bool,

    /// Payload on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default)]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(tool: impl Into<String>, output: Value) -> Self {
        Self {
            tool: tool.into(),
            id: None,
            success: true,
            output: Some(output),
            error: None,
            is_error: false,
        }
    }

    pub fn failure(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            id: None,
            success: false,
            output: None,
            error: Some(error.into()),
            is_error: true,
        }
    }

    /// Attach the correlation id of the originating call
    pub fn for_call(mut self, call: &ToolCall) -> Self {
        self.id.clone_from(&call.id);
        self
    }

    /// Text form used when feeding the result back to the model
    pub fn render(&self) -> String {
        if self.success {
            let body = match &self.output {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            format!("[Tool '{}' returned]\n{}", self.tool, body)
        } else {
            format!(
                "[Tool '{}' failed]\n{}",
                self.tool,
                self.error.as_deref().unwrap_or("unknown error")
            )
        }
    }
}

/// JSON type a parameter is declared with
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    /// Permissive: accepts any value
    Object,
}

impl ParamType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    /// Whether a concrete JSON value matches this declared type
    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Object => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
        }
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,

    #[serde(rename = "type")]
    pub param_type: ParamType,

    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Allowed values, compared against the string form of the argument
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: description.into(),
            required: false,
            enum_values: None,
        }
    }

    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, ParamType::String, description)
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn one_of<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    fn json_schema(&self) -> Value {
        let mut schema = json!({
            "type": self.param_type.as_str(),
            "description": self.description,
        });
        if let Some(choices) = &self.enum_values {
            schema["enum"] = json!(choices);
        }
        schema
    }
}

/// Tool definition (shown to the LLM, checked by validation)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool identifier
    pub name: String,

    /// Natural-language description (consumed by the model)
    pub description: String,

    /// Parameter definitions, in declaration order
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
            category: None,
        }
    }

    /// Add a parameter, replacing any earlier one with the same name
    #[must_use]
    pub fn param(mut self, param: ParameterSchema) -> Self {
        self.parameters.retain(|p| p.name != param.name);
        self.parameters.push(param);
        self
    }

    #[must_use]
    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterSchema> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON Schema object describing the parameters
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.json_schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Runs a tool. May fail; the registry turns failures into results.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        context: Option<&RequestContext>,
    ) -> anyhow::Result<Value>;
}

/// A tool that carries its own definition
pub trait Tool: ToolExecutor {
    fn definition(&self) -> ToolDefinition;
}

/// Executor backed by an async closure
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn execute(
        &self,
        parameters: &Map<String, Value>,
        _context: Option<&RequestContext>,
    ) -> anyhow::Result<Value> {
        (self.0)(parameters.clone()).await
    }
}

/// Wrap an async closure as an executor
pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn ToolExecutor>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

/// One tool exposed by a provider
#[derive(Clone)]
pub struct ProvidedTool {
    pub definition: ToolDefinition,
    pub executor: Option<Arc<dyn ToolExecutor>>,
}

impl ProvidedTool {
    pub fn from_tool<T: Tool + 'static>(tool: T) -> Self {
        Self {
            definition: tool.definition(),
            executor: Some(Arc::new(tool)),
        }
    }

    pub fn descriptive(definition: ToolDefinition) -> Self {
        Self {
            definition,
            executor: None,
        }
    }
}

/// Anything that owns a set of tools (agents included)
pub trait ToolProvider: Send + Sync {
    fn provided_tools(&self) -> Vec<ProvidedTool>;
}

/// Outcome of structural validation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Vendor convention used when exporting tool definitions
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// `{"type": "function", "function": {name, description, parameters}}`
    #[default]
    Function,
    /// `{name, description, input_schema}`
    InputSchema,
}

/// Registry for available tools
#[derive(Default)]
pub struct ToolRegistry {
    definitions: HashMap<String, ToolDefinition>,
    executors: HashMap<String, Arc<dyn ToolExecutor>>,
    providers: HashMap<String, Vec<String>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, optionally with its executor.
    ///
    /// Re-registering a name overwrites it (hot reload); a warning is logged.
    pub fn register(&mut self, definition: ToolDefinition, executor: Option<Arc<dyn ToolExecutor>>) {
        let name = definition.name.clone();
        if self.definitions.insert(name.clone(), definition).is_some() {
            warn!(tool = %name, "Overwriting existing tool definition");
        }
        if let Some(executor) = executor {
            self.executors.insert(name, executor);
        }
    }

    /// Attach (or replace) the executor for a tool name
    pub fn register_executor(&mut self, name: impl Into<String>, executor: Arc<dyn ToolExecutor>) {
        let name = name.into();
        if self.executors.insert(name.clone(), executor).is_some() {
            warn!(tool = %name, "Overwriting existing tool executor");
        }
    }

    /// Register a self-describing tool
    pub fn register_tool<T: Tool + 'static>(&mut self, tool: T) {
        let definition = tool.definition();
        self.register(definition, Some(Arc::new(tool)));
    }

    /// Import every tool a provider exposes. Returns how many were imported.
    pub fn register_provider(&mut self, name: impl Into<String>, provider: &dyn ToolProvider) -> usize {
        let name = name.into();
        let tools = provider.provided_tools();
        let mut imported = Vec::with_capacity(tools.len());

        for ProvidedTool { definition, executor } in tools {
            imported.push(definition.name.clone());
            self.register(definition, executor);
        }

        debug!(provider = %name, count = imported.len(), "Registered tool provider");
        let count = imported.len();
        self.providers.insert(name, imported);
        count
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.definitions.get(name)
    }

    pub fn has_executor(&self, name: &str) -> bool {
        self.executors.contains_key(name)
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Definitions, sorted by name
    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> = self.definitions.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Tool names imported from a provider
    pub fn provider_tools(&self, provider: &str) -> Option<&[String]> {
        self.providers.get(provider).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Look up a definition, failing with [`AgentError::ToolNotFound`]
    pub fn require(&self, name: &str) -> Result<&ToolDefinition> {
        self.definitions
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Check a call against the declared schema. Never fails; problems are
    /// reported in the returned errors.
    ///
    /// Errors come out in a fixed order: missing parameters, then unknown
    /// ones, then type and enum problems in schema declaration order.
    pub fn validate_tool_call(&self, call: &ToolCall) -> ValidationReport {
        let Some(definition) = self.definitions.get(&call.tool) else {
            return ValidationReport::from_errors(vec![format!("tool not found: {}", call.tool)]);
        };

        let mut errors = Vec::new();

        for param in definition.parameters.iter().filter(|p| p.required) {
            if !call.parameters.contains_key(&param.name) {
                errors.push(format!("missing required parameter: {}", param.name));
            }
        }

        for name in call.parameters.keys() {
            if definition.parameter(name).is_none() {
                errors.push(format!("unknown parameter: {name}"));
            }
        }

        for param in &definition.parameters {
            let Some(value) = call.parameters.get(&param.name) else {
                continue;
            };
            let name = &param.name;

            if !param.param_type.accepts(value) {
                errors.push(format!(
                    "parameter '{name}' expected type {} but got {}",
                    param.param_type,
                    json_type_name(value)
                ));
            }

            if let Some(choices) = &param.enum_values {
                let actual = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                if !choices.contains(&actual) {
                    errors.push(format!(
                        "parameter '{name}' must be one of [{}], got '{actual}'",
                        choices.join(", ")
                    ));
                }
            }
        }

        ValidationReport::from_errors(errors)
    }

    /// Execute a tool call.
    ///
    /// Total: every call yields exactly one result. A missing executor, an
    /// executor error and an executor panic all come back as failed results.
    pub async fn execute_tool(&self, call: &ToolCall, context: Option<&RequestContext>) -> ToolResult {
        let Some(executor) = self.executors.get(&call.tool) else {
            warn!(tool = %call.tool, "No executor registered");
            return ToolResult::failure(&call.tool, format!("no executor found for tool {}", call.tool))
                .for_call(call);
        };

        debug!(tool = %call.tool, "Executing tool");

        let outcome = AssertUnwindSafe(executor.execute(&call.parameters, context))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(output)) => ToolResult::success(&call.tool, output),
            Ok(Err(err)) => {
                warn!(tool = %call.tool, error = %err, "Tool execution failed");
                ToolResult::failure(&call.tool, err.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref(), "tool executor panicked");
                warn!(tool = %call.tool, error = %message, "Tool executor panicked");
                ToolResult::failure(&call.tool, message)
            }
        };

        result.for_call(call)
    }

    /// Project the tool set into a vendor convention
    pub fn export(&self, format: ExportFormat) -> Vec<Value> {
        match format {
            ExportFormat::Function => self.to_function_format(),
            ExportFormat::InputSchema => self.to_input_schema_format(),
        }
    }

    pub fn to_function_format(&self) -> Vec<Value> {
        self.definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "type": "function",
                    "function": {
                        "name": def.name,
                        "description": def.description,
                        "parameters": def.input_schema(),
                    }
                })
            })
            .collect()
    }

    pub fn to_input_schema_format(&self) -> Vec<Value> {
        self.definitions()
            .into_iter()
            .map(|def| {
                json!({
                    "name": def.name,
                    "description": def.description,
                    "input_schema": def.input_schema(),
                })
            })
            .collect()
    }

    /// Generate system prompt section describing the given tools
    /// (all tools when `only` is empty)
    pub fn generate_prompt_section(&self, only: &[String]) -> String {
        let mut prompt = String::from("## Available Tools\n\n");
        prompt.push_str("To use a tool, respond with a line of this exact form:\n\n");
        prompt.push_str("TOOL: {\"tool\": \"tool_name\", \"parameters\": {\"arg\": \"value\"}}\n\n");

        for def in self.definitions() {
            if !only.is_empty() && !only.contains(&def.name) {
                continue;
            }
            prompt.push_str(&format!("### {}\n{}\n", def.name, def.description));

            if !def.parameters.is_empty() {
                prompt.push_str("**Parameters:**\n");
                for param in &def.parameters {
                    let required = if param.required { " (required)" } else { "" };
                    prompt.push_str(&format!(
                        "- `{}` ({}){}: {}\n",
                        param.name, param.param_type, required, param.description
                    ));
                }
            }
            prompt.push('\n');
        }

        prompt
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send), fallback: &str) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        fallback.into()
    }
}
