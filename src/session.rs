//! Turn orchestration
//!
//! Ties the pieces together for one conversational session: classify and
//! route the incoming query, collect tool-call proposals that need human
//! approval, execute the approved batch, fold results back into the history,
//! and keep the context inside its token budget between turns.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::CoreConfig;
use crate::core::compaction::{CompactedContext, ContextCompactor};
use crate::core::context_monitor::{self, ContextStatus};
use crate::core::router::{Classified, QueryClassifier, RoutingDecision};
use crate::core::routing_stats::{ObservedOutcome, RoutingMonitor};
use crate::exec::batch::{
    BatchExecutionResult, CancelSignal, ExecutionStatus, ToolExecutor, execute_approved_tools,
};
use crate::exec::confirmation::{ConfirmationStateMachine, ToolConfirmation};
use crate::llm::provider::{LLMProvider, LLMRequest, Message, ToolDefinition};

/// Mutable state of one conversation
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub history: Vec<Message>,
}

impl Session {
    pub fn new(id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            system_prompt: system_prompt.into(),
            tools: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Everything decided at the start of a turn, before any tool runs
pub struct TurnPlan {
    pub classified: Classified,
    pub decision: RoutingDecision,
    /// Proposed tool calls awaiting approval; empty when none are needed
    pub confirmations: ConfirmationStateMachine,
    monitor_index: usize,
    started: Instant,
}

impl TurnPlan {
    /// Approve every proposed tool call; returns the approved ids
    pub fn approve_all(&mut self) -> Vec<String> {
        self.confirmations.approve_all()
    }

    /// Reject every proposed tool call
    pub fn reject_all(&mut self) -> Vec<String> {
        self.confirmations.reject_all()
    }
}

/// Session-scoped orchestrator.
///
/// One instance per deployment unit; sessions are passed in per call so the
/// orchestrator itself holds no per-conversation state.
pub struct TurnOrchestrator {
    config: CoreConfig,
    provider: Arc<dyn LLMProvider>,
    executor: Arc<dyn ToolExecutor>,
    compactor: ContextCompactor,
    monitor: RoutingMonitor,
}

impl TurnOrchestrator {
    pub fn new(
        config: CoreConfig,
        provider: Arc<dyn LLMProvider>,
        executor: Arc<dyn ToolExecutor>,
    ) -> Self {
        let compactor =
            ContextCompactor::new(config.context.clone(), config.compaction.clone());
        Self {
            config,
            provider,
            executor,
            compactor,
            monitor: RoutingMonitor::new(),
        }
    }

    /// Replace the default compactor (e.g. to inject an LLM-backed summarizer)
    pub fn with_compactor(mut self, compactor: ContextCompactor) -> Self {
        self.compactor = compactor;
        self
    }

    pub fn routing_monitor(&self) -> &RoutingMonitor {
        &self.monitor
    }

    /// Start a turn: record the query, classify, route, and collect tool-call
    /// proposals when the query needs side effects.
    ///
    /// Never fails: classification degrades internally, and a provider
    /// failure during proposal collection yields a plan with no proposals.
    pub async fn begin_turn(&self, session: &mut Session, query: &str) -> TurnPlan {
        let started = Instant::now();
        session.history.push(Message::user(query));

        let classified = QueryClassifier::hybrid_classify(
            query,
            &session.history,
            self.provider.as_ref(),
            &self.config.router,
        )
        .await;
        let decision = QueryClassifier::route(&classified);
        let monitor_index = self
            .monitor
            .record(classified.classification, decision.clone());
        debug!(
            target = %decision.target,
            confidence = decision.confidence,
            "turn routed"
        );

        let mut confirmations = ConfirmationStateMachine::new();
        if classified.classification.requires_tool_confirmation() {
            for proposal in self.propose_tool_calls(session).await {
                if let Err(error) = confirmations.propose(proposal) {
                    warn!(%error, "skipping malformed tool proposal");
                }
            }
        }

        TurnPlan {
            classified,
            decision,
            confirmations,
            monitor_index,
            started,
        }
    }

    /// Ask the provider which tools it wants to call for the pending query
    async fn propose_tool_calls(&self, session: &Session) -> Vec<ToolConfirmation> {
        if session.tools.is_empty() {
            return Vec::new();
        }
        let request = LLMRequest {
            messages: session.history.clone(),
            system_prompt: Some(session.system_prompt.clone()),
            tools: Some(session.tools.clone()),
            max_tokens: None,
            temperature: None,
        };

        match self.provider.generate(request).await {
            Ok(response) => response
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(|call| ToolConfirmation::new(call.id, call.name, call.arguments))
                .collect(),
            Err(error) => {
                warn!(%error, "provider unavailable; turn proceeds without tool proposals");
                Vec::new()
            }
        }
    }

    /// Execute the approved tool calls and fold the results into the history.
    ///
    /// Each settled call becomes a tool-role message: the result JSON on
    /// success, an error note on failure. Entries skipped by an early halt
    /// stay approved and produce no message.
    pub async fn execute_approved(
        &self,
        session: &mut Session,
        plan: &mut TurnPlan,
        cancel: &CancelSignal,
    ) -> BatchExecutionResult {
        let approved = plan.confirmations.approved_confirmations();

        let result = execute_approved_tools(
            approved,
            Arc::clone(&self.executor),
            &self.config.execution,
            cancel,
            |entry, index, total| {
                debug!(
                    tool = %entry.confirmation.tool_name,
                    index,
                    total,
                    status = ?entry.status,
                    "tool call settled"
                );
            },
        )
        .await;

        for entry in &result.results {
            let id = &entry.confirmation.id;
            match entry.status {
                ExecutionStatus::Succeeded => {
                    if let Err(error) = plan
                        .confirmations
                        .begin_execution(id)
                        .and_then(|()| plan.confirmations.complete(id))
                    {
                        warn!(%error, id, "confirmation state out of sync with execution");
                    }
                    let content = entry
                        .result
                        .as_ref()
                        .map(|value| value.to_string())
                        .unwrap_or_default();
                    session.history.push(Message::tool_result(
                        id.clone(),
                        entry.confirmation.tool_name.clone(),
                        content,
                    ));
                }
                ExecutionStatus::Failed => {
                    if let Err(error) = plan
                        .confirmations
                        .begin_execution(id)
                        .and_then(|()| plan.confirmations.fail(id))
                    {
                        warn!(%error, id, "confirmation state out of sync with execution");
                    }
                    let error = entry.error.as_deref().unwrap_or("unknown error");
                    session.history.push(Message::tool_result(
                        id.clone(),
                        entry.confirmation.tool_name.clone(),
                        format!("Tool execution failed: {error}"),
                    ));
                }
                // skipped by an early halt; no message, stays approved
                ExecutionStatus::Pending | ExecutionStatus::Running => {}
            }
        }

        result
    }

    /// Close out the turn: record the assistant reply and the observed
    /// outcome for routing accuracy analysis.
    pub fn complete_turn(
        &self,
        session: &mut Session,
        plan: &TurnPlan,
        reply: impl Into<String>,
        tool_calls_used: u32,
        success: bool,
    ) {
        session.history.push(Message::assistant(reply));
        self.monitor.record_outcome(
            plan.monitor_index,
            ObservedOutcome {
                handled_by: plan.decision.target.clone(),
                tool_calls_used,
                turns_used: 1,
                success,
            },
            plan.started.elapsed().as_millis() as u64,
        );
    }

    /// Keep the session inside its token budget between turns.
    ///
    /// Runs the compactor; when compaction happened, the history is replaced
    /// by the synopsis message plus the preserved recent messages. Returns
    /// the pass result so callers can inspect metrics.
    pub async fn prepare_context(&self, session: &mut Session) -> CompactedContext {
        let compacted = self
            .compactor
            .compact(
                &session.id,
                &session.history,
                &session.system_prompt,
                &session.tools,
            )
            .await;

        if compacted.was_compacted {
            let mut history = Vec::with_capacity(compacted.recent_messages.len() + 1);
            if let Some(summary) = compacted.summary_message() {
                history.push(summary);
            }
            history.extend(compacted.recent_messages.iter().cloned());
            session.history = history;
        } else if compacted.pruning_stats.is_some() {
            // compaction abandoned: keep the pruned-but-unsummarized history
            session.history = compacted.recent_messages.clone();
        }

        compacted
    }

    /// Current traffic-light status of the session's context budget
    pub fn context_status(&self, session: &Session) -> ContextStatus {
        let metrics = context_monitor::snapshot(
            &session.history,
            &session.system_prompt,
            &session.tools,
            &[],
            &self.config.context,
        );
        context_monitor::context_status(&metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::QueryCategory;
    use crate::llm::provider::{FinishReason, LLMError, LLMResponse, ToolCall};
    use async_trait::async_trait;
    use serde_json::{Value, json};

    /// Provider that proposes one run_tests call whenever tools are offered
    struct ToolCallingProvider;

    #[async_trait]
    impl LLMProvider for ToolCallingProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn generate(&self, request: LLMRequest) -> Result<LLMResponse, LLMError> {
            if request.tools.is_some() {
                return Ok(LLMResponse {
                    content: None,
                    tool_calls: Some(vec![ToolCall {
                        id: "call_1".to_string(),
                        name: "run_tests".to_string(),
                        arguments: json!({"suite": "unit"}),
                    }]),
                    usage: None,
                    finish_reason: FinishReason::ToolCalls,
                });
            }
            Ok(LLMResponse {
                content: Some("code/medium".to_string()),
                tool_calls: None,
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, tool_name: &str, arguments: &Value) -> anyhow::Result<Value> {
            Ok(json!({"tool": tool_name, "arguments": arguments, "passed": true}))
        }
    }

    fn test_tools() -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "run_tests",
            "Run the project test suite",
            json!({"type": "object", "properties": {"suite": {"type": "string"}}}),
        )]
    }

    fn orchestrator() -> TurnOrchestrator {
        TurnOrchestrator::new(
            CoreConfig::default(),
            Arc::new(ToolCallingProvider),
            Arc::new(EchoExecutor),
        )
    }

    #[tokio::test]
    async fn full_turn_routes_confirms_and_executes() {
        let orchestrator = orchestrator();
        let mut session =
            Session::new("s1", "You are a coding assistant.").with_tools(test_tools());

        let mut plan = orchestrator
            .begin_turn(&mut session, "fix the bug in parser.go")
            .await;
        assert_eq!(plan.classified.classification.category, QueryCategory::Code);
        assert_eq!(plan.decision.target, "code-worker");
        assert_eq!(plan.confirmations.len(), 1);

        let approved = plan.approve_all();
        assert_eq!(approved, vec!["call_1".to_string()]);

        let result = orchestrator
            .execute_approved(&mut session, &mut plan, &CancelSignal::none())
            .await;
        assert!(result.all_succeeded);
        assert_eq!(result.success_count, 1);

        // tool result folded into the history
        let tool_messages: Vec<_> = session
            .history
            .iter()
            .filter(|m| m.is_tool_result())
            .collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].name.as_deref(), Some("run_tests"));

        orchestrator.complete_turn(&mut session, &plan, "Tests pass.", 1, true);
        let stats = orchestrator.routing_monitor().enhanced_stats();
        assert_eq!(stats.outcomes_recorded, 1);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rejected_proposals_never_execute() {
        let orchestrator = orchestrator();
        let mut session = Session::new("s1", "").with_tools(test_tools());

        let mut plan = orchestrator
            .begin_turn(&mut session, "run the deployment")
            .await;
        assert!(!plan.confirmations.is_empty());
        plan.reject_all();

        let result = orchestrator
            .execute_approved(&mut session, &mut plan, &CancelSignal::none())
            .await;
        assert!(result.results.is_empty());
        assert!(!session.history.iter().any(|m| m.is_tool_result()));
    }

    struct BrokenExecutor;

    #[async_trait]
    impl ToolExecutor for BrokenExecutor {
        async fn execute(&self, _tool_name: &str, _arguments: &Value) -> anyhow::Result<Value> {
            anyhow::bail!("disk full")
        }
    }

    #[tokio::test]
    async fn failed_execution_marks_confirmation_failed() {
        let config = CoreConfig {
            execution: crate::config::ExecutionConfig {
                max_retries: 1,
                retry_delay: std::time::Duration::from_millis(1),
                ..crate::config::ExecutionConfig::default()
            },
            ..CoreConfig::default()
        };
        let orchestrator = TurnOrchestrator::new(
            config,
            Arc::new(ToolCallingProvider),
            Arc::new(BrokenExecutor),
        );
        let mut session = Session::new("s1", "").with_tools(test_tools());

        let mut plan = orchestrator
            .begin_turn(&mut session, "run the deployment")
            .await;
        plan.approve_all();

        let result = orchestrator
            .execute_approved(&mut session, &mut plan, &CancelSignal::none())
            .await;
        assert_eq!(result.failure_count, 1);
        assert_eq!(
            plan.confirmations.state_of("call_1"),
            Some(crate::exec::ConfirmationState::Failed)
        );
        let tool_message = session
            .history
            .iter()
            .find(|m| m.is_tool_result())
            .expect("failure folded into history");
        assert!(tool_message.content.contains("disk full"));
    }

    #[tokio::test]
    async fn simple_queries_produce_no_proposals() {
        let orchestrator = orchestrator();
        let mut session = Session::new("s1", "").with_tools(test_tools());

        let plan = orchestrator.begin_turn(&mut session, "hello").await;
        assert!(plan.confirmations.is_empty());
        assert_eq!(plan.decision.target, "general-worker");
    }

    #[tokio::test]
    async fn prepare_context_compacts_long_histories() {
        let config = CoreConfig {
            context: crate::config::ContextConfig {
                max_tokens: 100,
                compaction_threshold: 0.8,
            },
            ..CoreConfig::default()
        };
        let orchestrator = TurnOrchestrator::new(
            config,
            Arc::new(ToolCallingProvider),
            Arc::new(EchoExecutor),
        );
        let mut session = Session::new("s1", "");
        for i in 0..10 {
            session
                .history
                .push(Message::user(format!("question {i}: {}", "x".repeat(200))));
            session
                .history
                .push(Message::assistant(format!("answer {i}: {}", "y".repeat(200))));
        }

        let compacted = orchestrator.prepare_context(&mut session).await;
        assert!(compacted.was_compacted);
        // synopsis message plus the preserved tail
        assert!(session.history.len() <= 6);
        assert!(session.history[0].content.starts_with("Previous conversation summary:"));
    }
}
