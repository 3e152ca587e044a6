//! # switchboard-runtime
//!
//! Model providers for switchboard agents.
//!
//! ## Providers
//!
//! - **Ollama** (default): local inference via Ollama
//! - **Static**: canned completions for offline runs and tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use switchboard_runtime::ollama::{OllamaConfig, OllamaProvider};
//!
//! let provider = Arc::new(OllamaProvider::from_config(OllamaConfig::from_env()));
//! let agent = LlmAgent::builder("general", "Answers anything")
//!     .provider(provider)
//!     .build()?;
//! ```

#[cfg(feature = "ollama")]
pub mod ollama;
pub mod scripted;

#[cfg(feature = "ollama")]
pub use ollama::{OllamaConfig, OllamaProvider};
pub use scripted::StaticProvider;

pub use switchboard_core::{AgentError, LlmProvider, Message, Result, Role};
