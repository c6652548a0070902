// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Which of the four provider wire families a model speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenAiChat,
    OpenAiResponses,
    Gemini,
    Mock,
}

impl Default for ProviderKind {
    fn default() -> Self {
        ProviderKind::Mock
    }
}

/// Configuration for a single model endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub provider: ProviderKind,
    pub name: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Anthropic prompt-caching knobs; ignored by other providers.
    pub cache_system_prompt: bool,
    pub cache_tools: bool,
    pub cache_conversation: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            name: "mock-model".into(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            cache_system_prompt: true,
            cache_tools: true,
            cache_conversation: false,
        }
    }
}

/// Loop-level knobs: compaction thresholds, retry budgets, reminders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_tool_rounds: u32,
    pub turn_retry_budget: u32,
    /// Estimated-token threshold above which the task loop runs a
    /// compaction turn before the next LLM call.
    pub compaction_token_threshold: u64,
    /// Number of most-recent turns kept verbatim (never folded into a
    /// compaction summary), regardless of threshold.
    pub compaction_keep_recent_turns: u32,
    /// Developer-message reminders injected once per N turns.
    pub reminder_every_n_turns: u32,
    pub reminder_text: Option<String>,
    /// Tool output above this many chars is offloaded to a side file and
    /// truncated in the text handed back to the model.
    pub tool_output_char_cap: usize,
    pub tool_output_head_chars: usize,
    pub tool_output_tail_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: 50,
            turn_retry_budget: 3,
            compaction_token_threshold: 120_000,
            compaction_keep_recent_turns: 4,
            reminder_every_n_turns: 0,
            reminder_text: None,
            tool_output_char_cap: 16_000,
            tool_output_head_chars: 4_000,
            tool_output_tail_chars: 2_000,
        }
    }
}

/// Tool-execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub shell_timeout_secs: u64,
    pub shell_max_timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            shell_timeout_secs: 120,
            shell_max_timeout_secs: 600,
        }
    }
}

/// Top-level configuration tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub providers: HashMap<String, ModelConfig>,
    pub agent: AgentConfig,
    pub tools: ToolsConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_mock_provider() {
        let cfg = Config::default();
        assert_eq!(cfg.model.provider, ProviderKind::Mock);
    }

    #[test]
    fn default_agent_config_has_nonzero_retry_budget() {
        assert!(AgentConfig::default().turn_retry_budget > 0);
    }

    #[test]
    fn serde_round_trip_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.agent.max_tool_rounds, cfg.agent.max_tool_rounds);
    }
}
