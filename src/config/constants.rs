//! Centralized constants for the orchestration core
//!
//! Token accounting, context thresholds, and execution defaults live here so
//! behavior stays consistent across modules and tests.

/// Token estimation constants
pub mod tokens {
    /// Approximate number of characters per token
    pub const CHARS_PER_TOKEN: usize = 4;

    /// Fixed overhead added per estimated string (role framing, separators)
    pub const STRING_OVERHEAD_TOKENS: usize = 1;

    /// Fixed overhead added per message (role tag, message envelope)
    pub const MESSAGE_OVERHEAD_TOKENS: usize = 4;

    /// Fixed overhead added per tool definition (schema envelope)
    pub const TOOL_OVERHEAD_TOKENS: usize = 8;
}

/// Context budget thresholds
pub mod context {
    /// Default maximum context budget in tokens
    pub const DEFAULT_MAX_TOKENS: usize = 128_000;

    /// Default utilization at which compaction triggers
    pub const DEFAULT_COMPACTION_THRESHOLD: f64 = 0.8;

    /// Utilization below this is reported green
    pub const STATUS_GREEN_BELOW: f64 = 0.75;

    /// Utilization below this (and at or above green) is reported yellow
    pub const STATUS_YELLOW_BELOW: f64 = 0.85;

    /// Number of most recent messages always preserved verbatim by compaction
    pub const DEFAULT_PRESERVE_RECENT_MESSAGES: usize = 5;

    /// Default maximum length for a tool result before truncation
    pub const DEFAULT_TOOL_RESULT_MAX_LEN: usize = 4_000;

    /// Default age (in messages) after which a tool result is cleared
    pub const DEFAULT_TOOL_RESULT_TURN_THRESHOLD: usize = 20;

    /// Suffix appended to truncated tool results
    pub const TRUNCATION_SUFFIX: &str = "...[Truncated]";

    /// Placeholder substituted for aged-out tool results
    pub const CLEARED_PLACEHOLDER: &str = "[Tool result cleared to save context]";

    /// Maximum length of the deterministic fallback summary
    pub const DEFAULT_SUMMARY_MAX_LEN: usize = 2_000;
}

/// Routing defaults
pub mod routing {
    /// Confidence floor below which hybrid classification escalates to the LLM
    pub const DEFAULT_CONFIDENCE_FLOOR: f64 = 0.6;

    /// Confidence penalty applied when classification degrades to the default
    pub const DEGRADED_CONFIDENCE: f64 = 0.3;

    /// Query length above which complexity is bumped to high
    pub const LONG_QUERY_CHARS: usize = 1_200;

    /// Query length below which a bare query is considered low complexity
    pub const SHORT_QUERY_CHARS: usize = 120;
}

/// Worker identifiers used by the routing decision table
pub mod workers {
    pub const GENERAL: &str = "general-worker";
    pub const CODE: &str = "code-worker";
    pub const RESEARCH: &str = "research-worker";
    pub const GITHUB: &str = "github-worker";
    pub const ADMIN: &str = "admin-worker";
}

/// Tool execution defaults
pub mod execution {
    use std::time::Duration;

    /// Default per-call timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default maximum attempts per call (first attempt included)
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Default delay between attempts
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

    /// Default bound on concurrently running tool calls
    pub const DEFAULT_MAX_CONCURRENCY: usize = 3;
}
