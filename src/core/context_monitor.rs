//! Context budget monitoring
//!
//! Produces a [`ContextMetrics`] snapshot from the message history, system
//! prompt, tool definitions, and any retrieved context. Snapshots are always
//! recomputed from the current message set; nothing here caches.

use serde::{Deserialize, Serialize};

use crate::config::ContextConfig;
use crate::config::constants::context;
use crate::core::token_estimator::{estimate_message_tokens, estimate_tokens, estimate_tool_tokens};
use crate::llm::provider::{Message, ToolDefinition};

/// Token breakdown by source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBreakdown {
    pub system_prompt: usize,
    pub tools: usize,
    pub history: usize,
    pub retrieved: usize,
}

/// Snapshot of the context budget at one point in a turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextMetrics {
    pub total_tokens: usize,
    /// Ratio of total tokens to the configured budget; may exceed 1.0
    pub utilization: f64,
    pub breakdown: TokenBreakdown,
    pub message_count: usize,
    pub tool_result_count: usize,
}

/// Traffic-light status for UI and observability parity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextStatus {
    pub level: StatusLevel,
    pub message: String,
}

/// Compute a fresh metrics snapshot from the current message set
pub fn snapshot(
    messages: &[Message],
    system_prompt: &str,
    tools: &[ToolDefinition],
    retrieved: &[String],
    config: &ContextConfig,
) -> ContextMetrics {
    let breakdown = TokenBreakdown {
        system_prompt: estimate_tokens(system_prompt),
        tools: estimate_tool_tokens(tools),
        history: messages.iter().map(estimate_message_tokens).sum(),
        retrieved: retrieved.iter().map(|chunk| estimate_tokens(chunk)).sum(),
    };

    let total_tokens =
        breakdown.system_prompt + breakdown.tools + breakdown.history + breakdown.retrieved;
    let utilization = if config.max_tokens > 0 {
        total_tokens as f64 / config.max_tokens as f64
    } else {
        0.0
    };

    ContextMetrics {
        total_tokens,
        utilization,
        breakdown,
        message_count: messages.len(),
        tool_result_count: messages.iter().filter(|m| m.is_tool_result()).count(),
    }
}

/// Whether utilization has crossed the compaction threshold
pub fn needs_compaction(metrics: &ContextMetrics, threshold: f64) -> bool {
    metrics.utilization >= threshold
}

/// Map utilization to a traffic-light status with fixed thresholds:
/// `< 0.75` green, `< 0.85` yellow, otherwise red.
pub fn context_status(metrics: &ContextMetrics) -> ContextStatus {
    let percent = metrics.utilization * 100.0;
    if metrics.utilization < context::STATUS_GREEN_BELOW {
        ContextStatus {
            level: StatusLevel::Green,
            message: format!("Context healthy at {percent:.1}% of budget"),
        }
    } else if metrics.utilization < context::STATUS_YELLOW_BELOW {
        ContextStatus {
            level: StatusLevel::Yellow,
            message: format!("Context at {percent:.1}% of budget; compaction recommended"),
        }
    } else {
        ContextStatus {
            level: StatusLevel::Red,
            message: format!("Context at {percent:.1}% of budget; compaction required"),
        }
    }
}
