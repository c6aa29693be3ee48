//! Batch executor behavior across strategies

use async_trait::async_trait;
use maestro_core::config::ExecutionConfig;
use maestro_core::exec::{
    CancelSignal, ExecutionStatus, ToolConfirmation, ToolExecutor, cancellation_pair,
    execute_approved_tools, execute_tool, execute_tools_parallel,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

fn options() -> ExecutionConfig {
    ExecutionConfig {
        timeout: Duration::from_millis(500),
        max_retries: 1,
        retry_delay: Duration::from_millis(1),
        continue_on_error: true,
        max_concurrency: 3,
    }
}

fn batch(ids: &[&str], tool: &str) -> Vec<ToolConfirmation> {
    ids.iter()
        .map(|id| ToolConfirmation::new(*id, tool, json!({})))
        .collect()
}

/// Fails every tool whose name starts with "bad"
struct NamedFailureExecutor;

#[async_trait]
impl ToolExecutor for NamedFailureExecutor {
    async fn execute(&self, tool_name: &str, _arguments: &Value) -> anyhow::Result<Value> {
        if tool_name.starts_with("bad") {
            anyhow::bail!("simulated failure in {tool_name}")
        }
        Ok(json!({"tool": tool_name}))
    }
}

/// Fails the first call per process, then succeeds
struct TransientExecutor {
    calls: AtomicU32,
}

#[async_trait]
impl ToolExecutor for TransientExecutor {
    async fn execute(&self, _tool_name: &str, _arguments: &Value) -> anyhow::Result<Value> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            anyhow::bail!("transient network error")
        }
        Ok(json!({"recovered": true}))
    }
}

/// Records peak concurrent executions
struct ConcurrencyProbe {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ToolExecutor for ConcurrencyProbe {
    async fn execute(&self, tool_name: &str, _arguments: &Value) -> anyhow::Result<Value> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(json!({"tool": tool_name}))
    }
}

#[tokio::test]
async fn halting_batch_leaves_unexecuted_entries_pending() {
    let confirmations = vec![
        ToolConfirmation::new("c1", "good_first", json!({})),
        ToolConfirmation::new("c2", "bad_second", json!({})),
        ToolConfirmation::new("c3", "good_third", json!({})),
    ];
    let options = ExecutionConfig {
        continue_on_error: false,
        ..options()
    };

    let result = execute_approved_tools(
        confirmations,
        Arc::new(NamedFailureExecutor),
        &options,
        &CancelSignal::none(),
        |_, _, _| {},
    )
    .await;

    assert_eq!(result.success_count, 1);
    assert_eq!(result.failure_count, 1);
    assert!(!result.all_succeeded);
    assert_eq!(result.results[0].status, ExecutionStatus::Succeeded);
    assert_eq!(result.results[1].status, ExecutionStatus::Failed);
    assert_eq!(result.results[2].status, ExecutionStatus::Pending);
    assert!(result.results[1]
        .error
        .as_deref()
        .unwrap()
        .contains("bad_second"));
}

#[tokio::test]
async fn settled_batches_account_for_every_entry() {
    let result = execute_approved_tools(
        batch(&["c1", "c2", "c3", "c4"], "probe"),
        Arc::new(NamedFailureExecutor),
        &options(),
        &CancelSignal::none(),
        |_, _, _| {},
    )
    .await;

    assert_eq!(result.success_count + result.failure_count, result.results.len());
    assert!(result.all_succeeded);
}

#[tokio::test]
async fn retry_recovers_from_a_transient_failure() {
    let options = ExecutionConfig {
        max_retries: 2,
        ..options()
    };

    let entry = execute_tool(
        ToolConfirmation::new("c1", "run_tests", json!({"suite": "unit"})),
        Arc::new(TransientExecutor {
            calls: AtomicU32::new(0),
        }),
        &options,
        &CancelSignal::none(),
    )
    .await;

    assert_eq!(entry.status, ExecutionStatus::Succeeded);
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.result, Some(json!({"recovered": true})));
}

#[tokio::test]
async fn retry_budget_is_total_attempts() {
    let options = ExecutionConfig {
        max_retries: 2,
        ..options()
    };

    let entry = execute_tool(
        ToolConfirmation::new("c1", "bad_tool", json!({})),
        Arc::new(NamedFailureExecutor),
        &options,
        &CancelSignal::none(),
    )
    .await;

    assert_eq!(entry.status, ExecutionStatus::Failed);
    assert_eq!(entry.attempts, 2);
}

#[tokio::test]
async fn parallel_bounds_concurrency_and_preserves_order() {
    let probe = Arc::new(ConcurrencyProbe {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let options = ExecutionConfig {
        max_concurrency: 2,
        ..options()
    };

    let result = execute_tools_parallel(
        batch(&["c1", "c2", "c3", "c4", "c5"], "probe"),
        probe.clone(),
        &options,
        &CancelSignal::none(),
    )
    .await;

    assert_eq!(result.success_count, 5);
    assert!(result.all_succeeded);
    assert!(probe.peak.load(Ordering::SeqCst) <= 2);
    let ids: Vec<&str> = result
        .results
        .iter()
        .map(|entry| entry.confirmation.id.as_str())
        .collect();
    assert_eq!(ids, vec!["c1", "c2", "c3", "c4", "c5"]);
}

#[tokio::test]
async fn cancellation_before_dispatch_settles_nothing() {
    let (handle, signal) = cancellation_pair();
    handle.cancel();

    let result = execute_tools_parallel(
        batch(&["c1", "c2", "c3"], "probe"),
        Arc::new(NamedFailureExecutor),
        &options(),
        &signal,
    )
    .await;

    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 0);
    assert!(result
        .results
        .iter()
        .all(|entry| entry.status == ExecutionStatus::Pending));
}
