//! Approved-tool batch execution
//!
//! Runs approved confirmations through an injected [`ToolExecutor`], either
//! strictly sequentially or with bounded concurrency. Each call gets an
//! independent timeout and retry budget. A batch never throws: per-call
//! errors land in the entry's `error` field and the caller gets a well-formed
//! [`BatchExecutionResult`] even on partial failure.
//!
//! Timed-out and cancelled calls are abandoned, not force-cancelled: the
//! executor invocation runs on its own task and its eventual result is
//! discarded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, warn};

use crate::config::ExecutionConfig;
use crate::exec::confirmation::ToolConfirmation;

/// Tool execution seam, injected per deployment; may fail
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool_name: &str, arguments: &Value) -> anyhow::Result<Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Execution record for one confirmation; status transitions are monotonic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEntry {
    pub confirmation: ToolConfirmation,
    pub status: ExecutionStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

impl ExecutionEntry {
    fn pending(confirmation: ToolConfirmation) -> Self {
        Self {
            confirmation,
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            attempts: 0,
            duration_ms: 0,
        }
    }
}

/// Outcome of one batch; `success_count + failure_count == results.len()`
/// whenever every entry ran (entries skipped after an early halt stay
/// `pending` and count toward neither side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchExecutionResult {
    pub results: Vec<ExecutionEntry>,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_duration_ms: u64,
    pub all_succeeded: bool,
}

/// Turn-scoped cancellation signal shared by all in-flight tool calls
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn none() -> Self {
        Self { receiver: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolves when the turn is cancelled; never resolves otherwise
    async fn cancelled(&mut self) {
        match self.receiver.as_mut() {
            Some(receiver) => loop {
                if *receiver.borrow() {
                    return;
                }
                if receiver.changed().await.is_err() {
                    // handle dropped without cancelling
                    std::future::pending::<()>().await;
                }
            },
            None => std::future::pending().await,
        }
    }
}

/// Cancels the associated [`CancelSignal`] clones
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }
}

/// Create a linked cancel handle/signal pair for one turn
pub fn cancellation_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (
        CancelHandle { sender },
        CancelSignal {
            receiver: Some(receiver),
        },
    )
}

/// Run a single confirmation with timeout and retry.
///
/// Makes up to `options.max_retries` attempts (the first attempt included),
/// sleeping `options.retry_delay` between them. A timeout counts as a failed
/// attempt; the in-flight call keeps running on its own task and its result
/// is discarded.
pub async fn execute_tool(
    confirmation: ToolConfirmation,
    executor: Arc<dyn ToolExecutor>,
    options: &ExecutionConfig,
    cancel: &CancelSignal,
) -> ExecutionEntry {
    let started = Instant::now();
    let mut entry = ExecutionEntry::pending(confirmation);
    entry.status = ExecutionStatus::Running;

    let max_attempts = options.max_retries.max(1);
    let mut cancel = cancel.clone();

    loop {
        if cancel.is_cancelled() {
            entry.status = ExecutionStatus::Failed;
            entry.error = Some("cancelled".to_string());
            break;
        }
        entry.attempts += 1;

        let call = {
            let executor = Arc::clone(&executor);
            let tool_name = entry.confirmation.tool_name.clone();
            let arguments = entry.confirmation.arguments.clone();
            tokio::spawn(async move { executor.execute(&tool_name, &arguments).await })
        };

        let attempt_error = tokio::select! {
            _ = cancel.cancelled() => {
                entry.status = ExecutionStatus::Failed;
                entry.error = Some("cancelled".to_string());
                break;
            }
            outcome = tokio::time::timeout(options.timeout, call) => match outcome {
                Ok(Ok(Ok(value))) => {
                    entry.status = ExecutionStatus::Succeeded;
                    entry.result = Some(value);
                    break;
                }
                Ok(Ok(Err(error))) => error.to_string(),
                Ok(Err(join_error)) => format!("executor task aborted: {join_error}"),
                Err(_) => format!("timed out after {:?}", options.timeout),
            },
        };

        debug!(
            tool = %entry.confirmation.tool_name,
            attempt = entry.attempts,
            error = %attempt_error,
            "tool call attempt failed"
        );

        if entry.attempts >= max_attempts {
            entry.status = ExecutionStatus::Failed;
            entry.error = Some(attempt_error);
            break;
        }
        tokio::time::sleep(options.retry_delay).await;
    }

    entry.duration_ms = started.elapsed().as_millis() as u64;
    entry
}

/// Sequential strategy: one call in flight at a time, in input order.
///
/// When `options.continue_on_error` is false, a failure skips the remaining
/// confirmations; skipped entries stay `pending`. `on_progress` fires after
/// each executed entry.
pub async fn execute_approved_tools<F>(
    confirmations: Vec<ToolConfirmation>,
    executor: Arc<dyn ToolExecutor>,
    options: &ExecutionConfig,
    cancel: &CancelSignal,
    mut on_progress: F,
) -> BatchExecutionResult
where
    F: FnMut(&ExecutionEntry, usize, usize),
{
    let started = Instant::now();
    let total = confirmations.len();
    let mut results: Vec<ExecutionEntry> = confirmations
        .iter()
        .cloned()
        .map(ExecutionEntry::pending)
        .collect();

    let mut halted = false;
    for (index, confirmation) in confirmations.into_iter().enumerate() {
        if halted || cancel.is_cancelled() {
            break;
        }
        let entry = execute_tool(confirmation, Arc::clone(&executor), options, cancel).await;
        on_progress(&entry, index, total);
        if entry.status == ExecutionStatus::Failed && !options.continue_on_error {
            warn!(
                tool = %entry.confirmation.tool_name,
                "halting batch after failure (continue_on_error = false)"
            );
            halted = true;
        }
        results[index] = entry;
    }

    finalize(results, started)
}

/// Parallel strategy: same per-call semantics as sequential, dispatched with
/// at most `options.max_concurrency` calls in flight. Completion order is
/// unordered; `results` preserves input order.
pub async fn execute_tools_parallel(
    confirmations: Vec<ToolConfirmation>,
    executor: Arc<dyn ToolExecutor>,
    options: &ExecutionConfig,
    cancel: &CancelSignal,
) -> BatchExecutionResult {
    let started = Instant::now();
    let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));

    let tasks = confirmations.into_iter().map(|confirmation| {
        let semaphore = Arc::clone(&semaphore);
        let executor = Arc::clone(&executor);
        let options = options.clone();
        let cancel = cancel.clone();
        async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                // semaphore is never closed; defensive arm for completeness
                return ExecutionEntry::pending(confirmation);
            };
            if cancel.is_cancelled() {
                return ExecutionEntry::pending(confirmation);
            }
            execute_tool(confirmation, executor, &options, &cancel).await
        }
    });

    // join_all preserves input order regardless of completion order
    let results = futures::future::join_all(tasks).await;
    finalize(results, started)
}

fn finalize(results: Vec<ExecutionEntry>, started: Instant) -> BatchExecutionResult {
    let success_count = results
        .iter()
        .filter(|entry| entry.status == ExecutionStatus::Succeeded)
        .count();
    let failure_count = results
        .iter()
        .filter(|entry| entry.status == ExecutionStatus::Failed)
        .count();
    let all_succeeded = failure_count == 0 && success_count == results.len();

    BatchExecutionResult {
        results,
        success_count,
        failure_count,
        total_duration_ms: started.elapsed().as_millis() as u64,
        all_succeeded,
    }
}
