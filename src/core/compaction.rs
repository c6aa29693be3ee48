//! Context compaction
//!
//! Checks the context monitor against the configured threshold and, when
//! exceeded, prunes the older slice of the history and collapses it into a
//! synopsis through an injected [`Summarizer`]. A summarizer failure abandons
//! compaction for the turn; message history is never corrupted.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::constants::context;
use crate::config::{CompactionConfig, ContextConfig};
use crate::core::context_monitor::{self, ContextMetrics};
use crate::core::context_pruner::{PruningStats, apply_pruning};
use crate::llm::provider::{LLMProvider, LLMRequest, Message, ToolDefinition};

/// Summarization seam: collapses rendered conversation text into a synopsis
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, content: &str) -> anyhow::Result<String>;
}

/// Best-effort persistence seam for compaction synopses
#[async_trait]
pub trait PersistenceHook: Send + Sync {
    async fn persist(
        &self,
        session_id: &str,
        summary: &str,
        metrics: &ContextMetrics,
    ) -> anyhow::Result<()>;
}

/// Result of one compaction pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactedContext {
    pub summary: String,
    pub recent_messages: Vec<Message>,
    pub was_compacted: bool,
    pub metrics: ContextMetrics,
    pub pruning_stats: Option<PruningStats>,
}

impl CompactedContext {
    /// Render the synopsis as a system message for the next LLM call
    pub fn summary_message(&self) -> Option<Message> {
        if self.summary.is_empty() {
            return None;
        }
        Some(Message::system(format!(
            "Previous conversation summary: {}",
            self.summary
        )))
    }
}

/// Deterministic fallback summarizer: head of the rendered conversation,
/// bounded to a fixed length. Cheap, no network.
#[derive(Debug, Clone, Default)]
pub struct TruncationSummarizer {
    max_len: usize,
}

impl TruncationSummarizer {
    pub fn new() -> Self {
        Self {
            max_len: context::DEFAULT_SUMMARY_MAX_LEN,
        }
    }

    pub fn with_max_len(max_len: usize) -> Self {
        Self { max_len }
    }
}

#[async_trait]
impl Summarizer for TruncationSummarizer {
    async fn summarize(&self, content: &str) -> anyhow::Result<String> {
        let max_len = if self.max_len == 0 {
            context::DEFAULT_SUMMARY_MAX_LEN
        } else {
            self.max_len
        };
        let mut summary = String::from("Earlier conversation (truncated): ");
        let budget = max_len.saturating_sub(summary.len());
        let mut cut = budget.min(content.len());
        while cut > 0 && !content.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.push_str(&content[..cut]);
        Ok(summary)
    }
}

/// Gateway-backed summarizer delegating to an [`LLMProvider`]
pub struct ProviderSummarizer {
    provider: Arc<dyn LLMProvider>,
}

impl ProviderSummarizer {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, content: &str) -> anyhow::Result<String> {
        let mut request = LLMRequest::from_user(format!(
            "Please summarize the following conversation:\n\n{content}"
        ));
        request.system_prompt = Some(
            "You summarize conversations. Produce a concise synopsis of the \
             following conversation, focusing on key decisions, completed \
             tasks, and important context. Keep it under 500 words."
                .to_string(),
        );
        request.max_tokens = Some(1000);
        request.temperature = Some(0.3);

        let response = self.provider.generate(request).await?;
        Ok(response.content.unwrap_or_default())
    }
}

/// Compaction orchestrator
pub struct ContextCompactor {
    context_config: ContextConfig,
    config: CompactionConfig,
    summarizer: Arc<dyn Summarizer>,
    persistence: Option<Arc<dyn PersistenceHook>>,
}

impl ContextCompactor {
    pub fn new(context_config: ContextConfig, config: CompactionConfig) -> Self {
        Self {
            context_config,
            config,
            summarizer: Arc::new(TruncationSummarizer::new()),
            persistence: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistenceHook>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Compact the history if utilization has crossed the threshold.
    ///
    /// Below the threshold this is a no-op: the input messages come back
    /// verbatim with `was_compacted == false`.
    pub async fn compact(
        &self,
        session_id: &str,
        messages: &[Message],
        system_prompt: &str,
        tools: &[ToolDefinition],
    ) -> CompactedContext {
        let metrics =
            context_monitor::snapshot(messages, system_prompt, tools, &[], &self.context_config);

        if !context_monitor::needs_compaction(&metrics, self.context_config.compaction_threshold) {
            return CompactedContext {
                summary: String::new(),
                recent_messages: messages.to_vec(),
                was_compacted: false,
                metrics,
                pruning_stats: None,
            };
        }

        let preserve = self.config.preserve_recent_messages;
        if messages.len() <= preserve {
            // Nothing old enough to summarize; leave the history alone.
            return CompactedContext {
                summary: String::new(),
                recent_messages: messages.to_vec(),
                was_compacted: false,
                metrics,
                pruning_stats: None,
            };
        }

        let split = messages.len() - preserve;
        let mut old: Vec<Message> = messages[..split].to_vec();
        let recent: Vec<Message> = messages[split..].to_vec();

        let pruning_stats = apply_pruning(&mut old, &self.config.pruning);
        let rendered = render_messages(&old);

        let summary = match self.summarizer.summarize(&rendered).await {
            Ok(summary) if !summary.trim().is_empty() => summary,
            Ok(_) => {
                warn!("summarizer returned an empty synopsis; compaction abandoned for this turn");
                return self.abandoned(old, recent, metrics, pruning_stats);
            }
            Err(error) => {
                warn!(%error, "summarizer failed; compaction abandoned for this turn");
                return self.abandoned(old, recent, metrics, pruning_stats);
            }
        };

        debug!(
            pruned = pruning_stats.total(),
            summarized = old.len(),
            preserved = recent.len(),
            "context compacted"
        );

        let compacted = CompactedContext {
            summary,
            recent_messages: recent,
            was_compacted: true,
            metrics,
            pruning_stats: Some(pruning_stats),
        };

        if self.config.persist_on_compaction {
            if let Some(persistence) = &self.persistence {
                if let Err(error) = persistence
                    .persist(session_id, &compacted.summary, &compacted.metrics)
                    .await
                {
                    warn!(%error, session_id, "failed to persist compaction summary");
                }
            }
        }

        compacted
    }

    /// Summarizer failure path: pruned-but-unsummarized history is used as-is
    fn abandoned(
        &self,
        mut old: Vec<Message>,
        recent: Vec<Message>,
        metrics: ContextMetrics,
        pruning_stats: PruningStats,
    ) -> CompactedContext {
        old.extend(recent);
        CompactedContext {
            summary: String::new(),
            recent_messages: old,
            was_compacted: false,
            metrics,
            pruning_stats: Some(pruning_stats),
        }
    }
}

/// Render messages to plain text for summarization
fn render_messages(messages: &[Message]) -> String {
    let mut text = String::new();
    for message in messages {
        text.push_str(message.role.as_str());
        text.push_str(": ");
        text.push_str(&message.content);
        text.push_str("\n\n");
    }
    text
}
