//! Ollama LLM Provider
//!
//! `LlmProvider` backed by a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::{
    Ollama,
    generation::chat::{ChatMessage, ChatMessageResponse, MessageRole, request::ChatMessageRequest},
    models::ModelOptions,
};
use switchboard_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{Completion, GenerationOptions, LlmProvider, ModelInfo, TokenUsage},
};
use tracing::{debug, warn};

/// Ollama provider configuration
#[derive(Clone, Debug)]
pub struct OllamaConfig {
    /// Ollama host URL
    pub host: String,

    /// Ollama port
    pub port: u16,

    /// Model used when callers don't override it
    pub model: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: "http://localhost".into(),
            port: 11434,
            model: "llama3.2".into(),
            timeout_secs: 120,
        }
    }
}

impl OllamaConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let host = std::env::var("OLLAMA_HOST").unwrap_or(defaults.host);
        let port = std::env::var("OLLAMA_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let model = std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model);
        let timeout_secs = std::env::var("OLLAMA_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(defaults.timeout_secs);

        Self {
            host,
            port,
            model,
            timeout_secs,
        }
    }

    /// Generation options preset to this config's model
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            model: self.model.clone(),
            ..Default::default()
        }
    }
}

/// Ollama LLM provider
pub struct OllamaProvider {
    client: Ollama,
    config: OllamaConfig,
}

impl OllamaProvider {
    pub fn from_config(config: OllamaConfig) -> Self {
        Self {
            client: Ollama::new(config.host.clone(), config.port),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::from_config(OllamaConfig::from_env())
    }

    pub const fn config(&self) -> &OllamaConfig {
        &self.config
    }

    fn convert_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::System => MessageRole::System,
                    Role::User => MessageRole::User,
                    Role::Assistant => MessageRole::Assistant,
                    // Observations go back in as user context
                    Role::Tool => MessageRole::User,
                };
                ChatMessage::new(role, m.content.clone())
            })
            .collect()
    }

    fn convert_completion(response: ChatMessageResponse, model: &str) -> Completion {
        let usage = response.final_data.as_ref().map(|d| {
            let prompt_tokens = saturate(d.prompt_eval_count);
            let completion_tokens = saturate(d.eval_count);
            TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens.saturating_add(completion_tokens),
            }
        });

        Completion {
            content: response.message.content,
            model: model.to_string(),
            usage,
        }
    }

    fn build_options(opts: &GenerationOptions) -> ModelOptions {
        ModelOptions::default()
            .temperature(opts.temperature)
            .top_p(opts.top_p)
            .num_predict(i32::try_from(opts.max_tokens).unwrap_or(i32::MAX))
    }
}

fn saturate(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn health_check(&self) -> Result<bool> {
        match self.client.list_local_models().await {
            Ok(_) => Ok(true),
            Err(e) => {
                warn!("Ollama health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let request = ChatMessageRequest::new(options.model.clone(), Self::convert_messages(messages))
            .options(Self::build_options(options));

        debug!(model = %options.model, messages = messages.len(), "Sending chat request");

        let timeout = Duration::from_secs(self.config.timeout_secs);
        let response = tokio::time::timeout(timeout, self.client.send_chat_messages(request))
            .await
            .map_err(|_| {
                AgentError::ProviderUnavailable(format!(
                    "ollama did not answer within {}s",
                    self.config.timeout_secs
                ))
            })?
            .map_err(|e| AgentError::Provider(e.to_string()))?;

        Ok(Self::convert_completion(response, &options.model))
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| AgentError::ProviderUnavailable(e.to_string()))?;

        Ok(models
            .into_iter()
            .map(|m| ModelInfo {
                id: m.name.clone(),
                name: m.name,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.host, "http://localhost");
        assert_eq!(config.port, 11434);
        assert_eq!(config.generation_options().model, "llama3.2");
    }

    #[test]
    fn test_tool_messages_become_user_context() {
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("Hello"),
            Message::tool("[Tool 'clock' returned]\nnoon", None),
        ];

        let converted = OllamaProvider::convert_messages(&messages);
        assert_eq!(converted.len(), 3);
        assert!(converted[2].content.contains("noon"));
    }
}
