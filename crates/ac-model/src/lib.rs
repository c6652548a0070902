// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod anthropic;
mod gemini;
mod mock;
mod openai_compat;
mod openai_responses;
mod provider;
pub mod sse;
mod types;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use mock::{MockProvider, ScriptStep, ScriptedMockProvider};
pub use openai_compat::OpenAiCompatProvider;
pub use openai_responses::OpenAiResponsesProvider;
pub use provider::{aborted_message, ModelProvider, ResponseStream, StreamItem};
pub use types::{
    approx_tokens, attach_developer_messages, join_text_parts, LLMCallParameter, Message, Part,
    StopReason, ToolSchema, ToolStatus, Usage,
};

use ac_config::{ModelConfig, ProviderKind};

/// Construct a boxed [`ModelProvider`] from configuration, dispatching on
/// [`ProviderKind`] to the matching wire-format adapter.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Box<dyn ModelProvider>> {
    let key = resolve_api_key(cfg);
    match cfg.provider {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::with_cache(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
            cfg.cache_system_prompt,
            cfg.cache_tools,
            cfg.cache_conversation,
        ))),
        ProviderKind::OpenAiChat => Ok(Box::new(OpenAiCompatProvider::new(
            "openai",
            cfg.name.clone(),
            key,
            cfg.base_url.as_deref().unwrap_or("https://api.openai.com/v1"),
            cfg.max_tokens,
            cfg.temperature,
            vec![],
        ))),
        ProviderKind::OpenAiResponses => Ok(Box::new(OpenAiResponsesProvider::new(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.max_tokens,
            cfg.temperature,
        ))),
        ProviderKind::Gemini => Ok(Box::new(GeminiProvider::new(
            cfg.name.clone(),
            key,
            cfg.base_url.clone(),
            cfg.temperature,
        ))),
        ProviderKind::Mock => Ok(Box::new(MockProvider::default())),
    }
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    None
}
