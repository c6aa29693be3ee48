//! Core orchestration: classification, routing, and context management

pub mod compaction;
pub mod context_monitor;
pub mod context_pruner;
pub mod router;
pub mod routing_stats;
pub mod token_estimator;

pub use compaction::{
    CompactedContext, ContextCompactor, PersistenceHook, ProviderSummarizer, Summarizer,
    TruncationSummarizer,
};
pub use context_monitor::{
    ContextMetrics, ContextStatus, StatusLevel, TokenBreakdown, context_status, needs_compaction,
    snapshot,
};
pub use context_pruner::{PruningStats, apply_pruning};
pub use router::{
    Classified, Complexity, EffortEstimate, QueryCategory, QueryClassification, QueryClassifier,
    QueryType, RoutingDecision,
};
pub use routing_stats::{
    AccuracyMetrics, CategoryAccuracy, EnhancedStats, ExportError, ObservedOutcome,
    RoutingMonitor, RoutingRecord,
};
pub use token_estimator::{estimate_message_tokens, estimate_tokens, estimate_tool_tokens};
