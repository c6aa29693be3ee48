//! Character-length token estimation
//!
//! Deterministic approximation used for context budgeting. Real tokenizers
//! are provider-specific; the budget math only needs a consistent, cheap
//! upper-bound estimate.

use crate::config::constants::tokens;
use crate::llm::provider::{Message, ToolDefinition};

/// Estimate the token cost of a string: `ceil(len / 4) + 1`, 0 for empty input
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(tokens::CHARS_PER_TOKEN) + tokens::STRING_OVERHEAD_TOKENS
}

/// Estimate the token cost of a message, including its fixed envelope overhead
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut total = estimate_tokens(&message.content) + tokens::MESSAGE_OVERHEAD_TOKENS;
    if let Some(name) = &message.name {
        total += estimate_tokens(name);
    }
    total
}

/// Estimate the token cost of a tool set as advertised to the provider
pub fn estimate_tool_tokens(tools: &[ToolDefinition]) -> usize {
    tools
        .iter()
        .map(|tool| {
            estimate_tokens(&tool.name)
                + estimate_tokens(&tool.description)
                + estimate_tokens(&tool.parameters.to_string())
                + tokens::TOOL_OVERHEAD_TOKENS
        })
        .sum()
}
