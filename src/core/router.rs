//! Query classification and routing
//!
//! Rule-based keyword/pattern classification with an optional LLM-assisted
//! fallback for low-confidence cases. Classification never fails: any
//! internal problem degrades to a safe default so the system always has a
//! routable decision.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::RouterConfig;
use crate::config::constants::{routing, workers};
use crate::llm::provider::{LLMProvider, LLMRequest, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Simple,
    Complex,
    ToolConfirmation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    General,
    Code,
    Research,
    Github,
    Admin,
}

impl QueryCategory {
    pub const ALL: [QueryCategory; 5] = [
        QueryCategory::General,
        QueryCategory::Code,
        QueryCategory::Research,
        QueryCategory::Github,
        QueryCategory::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryCategory::General => "general",
            QueryCategory::Code => "code",
            QueryCategory::Research => "research",
            QueryCategory::Github => "github",
            QueryCategory::Admin => "admin",
        }
    }
}

impl std::fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Low => "low",
            Complexity::Medium => "medium",
            Complexity::High => "high",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classification of one incoming query; produced once, immutable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryClassification {
    pub query_type: QueryType,
    pub category: QueryCategory,
    pub complexity: Complexity,
    /// Set when classification fell back to the safe default
    #[serde(default)]
    pub degraded: bool,
}

impl QueryClassification {
    /// Safe default used when classification degrades
    pub fn fallback() -> Self {
        Self {
            query_type: QueryType::Simple,
            category: QueryCategory::General,
            complexity: Complexity::Low,
            degraded: true,
        }
    }

    pub fn requires_tool_confirmation(&self) -> bool {
        self.query_type == QueryType::ToolConfirmation
    }
}

/// Classification plus the rule engine's confidence in it
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Classified {
    pub classification: QueryClassification,
    /// 0..1
    pub confidence: f64,
}

/// Expected work for a routed query, derived from complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffortEstimate {
    pub expected_tool_calls: u32,
    pub expected_turns: u32,
}

impl EffortEstimate {
    fn from_complexity(complexity: Complexity) -> Self {
        match complexity {
            Complexity::Low => Self {
                expected_tool_calls: 1,
                expected_turns: 1,
            },
            Complexity::Medium => Self {
                expected_tool_calls: 2,
                expected_turns: 2,
            },
            Complexity::High => Self {
                expected_tool_calls: 5,
                expected_turns: 4,
            },
        }
    }
}

/// Where a classified query is sent; derived, immutable, logged for analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub target: String,
    pub confidence: f64,
    pub effort: EffortEstimate,
}

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "yo", "thanks", "thank you", "ok", "okay", "got it", "bye", "goodbye",
    "good morning", "good evening",
];

const CODE_KEYWORDS: &[&str] = &[
    "```", "fn ", "def ", "class ", "impl ", "function", "compile", "refactor", "stack trace",
    "traceback", "segfault", "unit test", "lint",
];

const CODE_EXTENSIONS: &[&str] = &[
    ".rs", ".go", ".py", ".js", ".ts", ".java", ".c", ".cpp", ".rb", ".sh", ".toml", ".yaml",
];

const CODE_ACTION_VERBS: &[&str] = &["fix", "debug", "implement", "refactor", "optimize", "patch"];

const GITHUB_KEYWORDS: &[&str] = &[
    "github",
    "pull request",
    "pr #",
    "issue #",
    "merge request",
    "repository",
    "git clone",
];

const RESEARCH_KEYWORDS: &[&str] = &[
    "search",
    "research",
    "look up",
    "find out",
    "latest",
    "compare",
    "sources",
    "up-to-date",
    "documentation for",
];

const ADMIN_PREFIXES: &[&str] = &["/admin", "/config", "/restart", "/shutdown", "/ban", "/grant"];

const MULTI_STEP_INDICATORS: &[&str] = &[
    "step by step",
    "first",
    "then",
    "after that",
    "finally",
    "multi-step",
    "plan",
    "end-to-end",
    "and then",
];

const TOOL_INTENT_VERBS: &[&str] = &[
    "run", "execute", "deploy", "delete", "install", "create", "update", "write", "fix", "merge",
    "push", "restart",
];

/// Rule-based query classifier
pub struct QueryClassifier;

impl QueryClassifier {
    /// Classify a query against its conversation context.
    ///
    /// Never fails: blank input degrades to the safe default with a
    /// confidence penalty.
    pub fn classify(query: &str, history: &[Message]) -> Classified {
        let text = query.trim().to_lowercase();
        if text.is_empty() {
            return Classified {
                classification: QueryClassification::fallback(),
                confidence: routing::DEGRADED_CONFIDENCE,
            };
        }

        if let Some(classification) = Self::quick_classify(&text) {
            return Classified {
                classification,
                confidence: 0.95,
            };
        }

        let (category, category_confidence) = Self::classify_category(&text, history);
        let complexity = Self::classify_complexity(&text, category);
        let query_type = Self::classify_type(&text, complexity);

        let classification = QueryClassification {
            query_type,
            category,
            complexity,
            degraded: false,
        };
        debug!(
            category = %category,
            complexity = %complexity,
            confidence = category_confidence,
            "query classified"
        );

        Classified {
            classification,
            confidence: category_confidence,
        }
    }

    /// Fast path for trivial greetings and acknowledgements
    pub fn quick_classify(query: &str) -> Option<QueryClassification> {
        let normalized: String = query
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_ascii_punctuation())
            .collect();
        let normalized = normalized.trim();
        if GREETINGS.contains(&normalized) {
            return Some(QueryClassification {
                query_type: QueryType::Simple,
                category: QueryCategory::General,
                complexity: Complexity::Low,
                degraded: false,
            });
        }
        None
    }

    /// Rules first; below the confidence floor, escalate to the LLM when a
    /// router model is configured.
    ///
    /// The rule-based category takes precedence when both paths produced a
    /// non-default one. Any LLM failure keeps the rule-based result, so this
    /// path degrades rather than propagating errors.
    pub async fn hybrid_classify(
        query: &str,
        history: &[Message],
        provider: &dyn LLMProvider,
        config: &RouterConfig,
    ) -> Classified {
        let rule_based = Self::classify(query, history);
        if rule_based.confidence >= config.confidence_floor
            || config.llm_router_model.trim().is_empty()
        {
            return rule_based;
        }

        match Self::llm_classify(query, provider).await {
            Some(llm) => {
                let category = if rule_based.classification.category != QueryCategory::General {
                    rule_based.classification.category
                } else {
                    llm.category
                };
                Classified {
                    classification: QueryClassification {
                        query_type: rule_based.classification.query_type,
                        category,
                        complexity: llm.complexity,
                        degraded: false,
                    },
                    confidence: config.confidence_floor,
                }
            }
            None => {
                debug!("llm classification unavailable; keeping rule-based result");
                rule_based
            }
        }
    }

    async fn llm_classify(
        query: &str,
        provider: &dyn LLMProvider,
    ) -> Option<QueryClassification> {
        let mut request = LLMRequest::from_user(query.to_string());
        request.system_prompt = Some(
            "You are a routing classifier. Output exactly two labels separated \
             by a slash: category/complexity. Category is one of general | code \
             | research | github | admin. Complexity is one of low | medium | \
             high. No prose."
                .to_string(),
        );
        request.max_tokens = Some(8);
        request.temperature = Some(0.0);

        let response = provider.generate(request).await.ok()?;
        let text = response.content?.trim().to_lowercase();

        let category = match &text {
            t if t.contains("code") => QueryCategory::Code,
            t if t.contains("research") => QueryCategory::Research,
            t if t.contains("github") => QueryCategory::Github,
            t if t.contains("admin") => QueryCategory::Admin,
            _ => QueryCategory::General,
        };
        let complexity = match &text {
            t if t.contains("high") => Complexity::High,
            t if t.contains("medium") => Complexity::Medium,
            _ => Complexity::Low,
        };

        Some(QueryClassification {
            query_type: QueryType::Simple,
            category,
            complexity,
            degraded: false,
        })
    }

    fn classify_category(text: &str, history: &[Message]) -> (QueryCategory, f64) {
        if ADMIN_PREFIXES.iter().any(|p| text.starts_with(p)) {
            return (QueryCategory::Admin, 0.95);
        }
        if GITHUB_KEYWORDS.iter().any(|k| text.contains(k)) {
            return (QueryCategory::Github, 0.85);
        }

        let code_hits = CODE_KEYWORDS.iter().filter(|k| text.contains(*k)).count()
            + CODE_EXTENSIONS.iter().filter(|e| text.contains(*e)).count();
        if code_hits > 0 {
            let confidence = (0.7 + 0.1 * code_hits as f64).min(0.95);
            return (QueryCategory::Code, confidence);
        }

        if RESEARCH_KEYWORDS.iter().any(|k| text.contains(k)) {
            return (QueryCategory::Research, 0.75);
        }

        // Weak signal: a code-heavy recent exchange keeps follow-ups in Code.
        let recent_code_context = history
            .iter()
            .rev()
            .take(4)
            .any(|m| m.content.contains("```"));
        if recent_code_context {
            return (QueryCategory::Code, 0.5);
        }

        (QueryCategory::General, 0.5)
    }

    fn classify_complexity(text: &str, category: QueryCategory) -> Complexity {
        let multi_step_hits = MULTI_STEP_INDICATORS
            .iter()
            .filter(|k| text.contains(*k))
            .count();
        let conjunctions = text.matches(" and ").count() + text.matches("; ").count();

        if text.len() > routing::LONG_QUERY_CHARS || multi_step_hits >= 2 {
            return Complexity::High;
        }
        if multi_step_hits == 1 || conjunctions >= 2 || text.len() > routing::SHORT_QUERY_CHARS {
            return Complexity::Medium;
        }
        if category == QueryCategory::Code
            && CODE_ACTION_VERBS.iter().any(|v| text.contains(v))
        {
            // Modifying code is never trivially low-effort.
            return Complexity::Medium;
        }
        Complexity::Low
    }

    fn classify_type(text: &str, complexity: Complexity) -> QueryType {
        let wants_side_effects = TOOL_INTENT_VERBS
            .iter()
            .any(|v| text.split_whitespace().any(|word| word == *v));
        if wants_side_effects {
            return QueryType::ToolConfirmation;
        }
        match complexity {
            Complexity::Low => QueryType::Simple,
            Complexity::Medium | Complexity::High => QueryType::Complex,
        }
    }

    /// Fixed category × complexity decision table plus effort estimation
    pub fn route(classified: &Classified) -> RoutingDecision {
        let classification = &classified.classification;
        let target = match classification.category {
            QueryCategory::General => workers::GENERAL,
            QueryCategory::Code => workers::CODE,
            QueryCategory::Research => workers::RESEARCH,
            QueryCategory::Github => workers::GITHUB,
            QueryCategory::Admin => workers::ADMIN,
        };

        // High-complexity general queries go to research rather than chat.
        let target = if classification.category == QueryCategory::General
            && classification.complexity == Complexity::High
        {
            workers::RESEARCH
        } else {
            target
        };

        RoutingDecision {
            target: target.to_string(),
            confidence: classified.confidence,
            effort: EffortEstimate::from_complexity(classification.complexity),
        }
    }
}
