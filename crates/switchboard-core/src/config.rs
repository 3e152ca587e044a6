//! Configuration
//!
//! Dispatcher and turn settings, deserializable with defaults and loadable
//! from the environment.

use serde::{Deserialize, Serialize};

/// Longest delegation chain allowed for one request
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 3;

/// Default number of tool rounds per user turn
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Agents visited per request before delegation is cut off
    #[serde(default = "default_max_chain_depth")]
    pub max_chain_depth: usize,

    /// Agent used when no other agent claims a request
    #[serde(default)]
    pub default_agent: Option<String>,
}

fn default_max_chain_depth() -> usize {
    DEFAULT_MAX_CHAIN_DEPTH
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: default_max_chain_depth(),
            default_agent: None,
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        let max_chain_depth = std::env::var("SWITCHBOARD_MAX_CHAIN_DEPTH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CHAIN_DEPTH);
        let default_agent = std::env::var("SWITCHBOARD_DEFAULT_AGENT")
            .ok()
            .filter(|v| !v.is_empty());

        Self {
            max_chain_depth,
            default_agent,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TurnConfig {
    /// Dispatch/tool rounds before a turn gives up
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Validate calls against their schema before executing them
    #[serde(default = "default_true")]
    pub validate_tool_calls: bool,
}

fn default_max_tool_rounds() -> usize {
    DEFAULT_MAX_TOOL_ROUNDS
}

const fn default_true() -> bool {
    true
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            validate_tool_calls: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config: DispatchConfig = serde_json::from_str(r#"{"default_agent": "general"}"#).unwrap();
        assert_eq!(config.max_chain_depth, 3);
        assert_eq!(config.default_agent.as_deref(), Some("general"));

        let turn: TurnConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(turn.max_tool_rounds, 5);
        assert!(turn.validate_tool_calls);
    }
}
