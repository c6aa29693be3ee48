//! Configuration types for the orchestration core
//!
//! Everything is driven by plain serde structs with sensible defaults, so a
//! host application can deserialize a config file section straight into
//! [`CoreConfig`] or construct pieces programmatically.

pub mod constants;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use constants::{context, execution, routing};

/// Context budget configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum context budget in tokens
    pub max_tokens: usize,
    /// Utilization (0..1) at which compaction triggers
    pub compaction_threshold: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: context::DEFAULT_MAX_TOKENS,
            compaction_threshold: context::DEFAULT_COMPACTION_THRESHOLD,
        }
    }
}

/// Pruning configuration, applied before summarization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningConfig {
    /// Maximum tool result length before truncation
    pub tool_result_max_len: usize,
    /// Age in messages after which a tool result is cleared entirely
    pub tool_result_turn_threshold: usize,
    /// Whether redundant system messages are deduplicated
    pub deduplicate_system_messages: bool,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            tool_result_max_len: context::DEFAULT_TOOL_RESULT_MAX_LEN,
            tool_result_turn_threshold: context::DEFAULT_TOOL_RESULT_TURN_THRESHOLD,
            deduplicate_system_messages: true,
        }
    }
}

/// Compaction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Number of most recent messages preserved verbatim
    pub preserve_recent_messages: usize,
    /// Whether summaries are handed to the persistence callback
    pub persist_on_compaction: bool,
    /// Pruning applied to the older slice before summarization
    pub pruning: PruningConfig,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            preserve_recent_messages: context::DEFAULT_PRESERVE_RECENT_MESSAGES,
            persist_on_compaction: false,
            pruning: PruningConfig::default(),
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Confidence floor below which hybrid classification escalates to the LLM
    pub confidence_floor: f64,
    /// Model used for LLM-assisted classification; empty disables escalation
    pub llm_router_model: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            confidence_floor: routing::DEFAULT_CONFIDENCE_FLOOR,
            llm_router_model: String::new(),
        }
    }
}

/// Tool execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Per-call timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Maximum attempts per call, first attempt included
    pub max_retries: u32,
    /// Delay between attempts
    #[serde(with = "duration_millis")]
    pub retry_delay: Duration,
    /// Whether a failed call halts the remaining batch
    pub continue_on_error: bool,
    /// Bound on concurrently running tool calls
    pub max_concurrency: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout: execution::DEFAULT_TIMEOUT,
            max_retries: execution::DEFAULT_MAX_RETRIES,
            retry_delay: execution::DEFAULT_RETRY_DELAY,
            continue_on_error: true,
            max_concurrency: execution::DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Aggregated configuration for one orchestrator instance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoreConfig {
    pub context: ContextConfig,
    pub compaction: CompactionConfig,
    pub router: RouterConfig,
    pub execution: ExecutionConfig,
}

/// Serialize `Duration` as integer milliseconds for config files
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
