//! Routing observability
//!
//! Append-only log of classification and routing outcomes, plus rolling
//! statistics for offline analysis. Pure observability: nothing here feeds
//! back into routing decisions. The log is scoped to a constructed monitor
//! instance, not a process-wide store, and appends are safe from concurrent
//! turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::core::router::{QueryCategory, QueryClassification, RoutingDecision};

/// What actually happened to a routed query, observed after the fact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservedOutcome {
    /// Worker that ended up handling the query
    pub handled_by: String,
    pub tool_calls_used: u32,
    pub turns_used: u32,
    pub success: bool,
}

/// One routing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRecord {
    pub classification: QueryClassification,
    pub decision: RoutingDecision,
    pub actual_outcome: Option<ObservedOutcome>,
    pub latency_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Precision/recall-style stats for one category
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CategoryAccuracy {
    /// Records routed to this category's worker
    pub predicted: usize,
    /// Records whose observed handler belongs to this category's worker
    pub observed: usize,
    /// Records where prediction and observation agree
    pub correct: usize,
    pub precision: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub per_category: HashMap<QueryCategory, CategoryAccuracy>,
    /// Records with an observed outcome
    pub evaluated: usize,
    /// Fraction of evaluated records where the effort estimate held
    /// (observed tool calls within the predicted budget)
    pub effort_accuracy: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnhancedStats {
    pub total_records: usize,
    pub category_distribution: HashMap<QueryCategory, usize>,
    pub target_distribution: HashMap<String, usize>,
    pub outcomes_recorded: usize,
    pub success_rate: f64,
    pub average_latency_ms: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),
}

/// Append-only routing monitor
#[derive(Debug, Default)]
pub struct RoutingMonitor {
    records: Mutex<Vec<RoutingRecord>>,
}

impl RoutingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a routing event; returns its index for later outcome updates
    pub fn record(
        &self,
        classification: QueryClassification,
        decision: RoutingDecision,
    ) -> usize {
        let mut records = self.lock();
        records.push(RoutingRecord {
            classification,
            decision,
            actual_outcome: None,
            latency_ms: None,
            timestamp: Utc::now(),
        });
        records.len() - 1
    }

    /// Attach the observed outcome to a previously recorded event
    pub fn record_outcome(&self, index: usize, outcome: ObservedOutcome, latency_ms: u64) {
        let mut records = self.lock();
        if let Some(record) = records.get_mut(index) {
            record.actual_outcome = Some(outcome);
            record.latency_ms = Some(latency_ms);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Compare routing predictions against observed outcomes
    pub fn accuracy_metrics(&self) -> AccuracyMetrics {
        let records = self.lock();
        let mut per_category: HashMap<QueryCategory, CategoryAccuracy> = HashMap::new();
        let mut evaluated = 0;
        let mut effort_hits = 0;

        for record in records.iter() {
            let Some(outcome) = &record.actual_outcome else {
                continue;
            };
            evaluated += 1;

            let predicted = record.classification.category;
            let entry = per_category.entry(predicted).or_default();
            entry.predicted += 1;
            if outcome.handled_by == record.decision.target {
                entry.correct += 1;
            }

            for category in QueryCategory::ALL {
                if outcome.handled_by.starts_with(category.as_str()) {
                    per_category.entry(category).or_default().observed += 1;
                }
            }

            if outcome.tool_calls_used <= record.decision.effort.expected_tool_calls {
                effort_hits += 1;
            }
        }

        for accuracy in per_category.values_mut() {
            accuracy.precision = if accuracy.predicted > 0 {
                accuracy.correct as f64 / accuracy.predicted as f64
            } else {
                0.0
            };
            accuracy.recall = if accuracy.observed > 0 {
                accuracy.correct as f64 / accuracy.observed as f64
            } else {
                0.0
            };
        }

        AccuracyMetrics {
            per_category,
            evaluated,
            effort_accuracy: if evaluated > 0 {
                effort_hits as f64 / evaluated as f64
            } else {
                0.0
            },
        }
    }

    /// Distribution counts and latency aggregates
    pub fn enhanced_stats(&self) -> EnhancedStats {
        let records = self.lock();
        let mut category_distribution: HashMap<QueryCategory, usize> = HashMap::new();
        let mut target_distribution: HashMap<String, usize> = HashMap::new();
        let mut outcomes_recorded = 0;
        let mut successes = 0;
        let mut latency_sum = 0u64;
        let mut latency_count = 0u64;

        for record in records.iter() {
            *category_distribution
                .entry(record.classification.category)
                .or_default() += 1;
            *target_distribution
                .entry(record.decision.target.clone())
                .or_default() += 1;
            if let Some(outcome) = &record.actual_outcome {
                outcomes_recorded += 1;
                if outcome.success {
                    successes += 1;
                }
            }
            if let Some(latency) = record.latency_ms {
                latency_sum += latency;
                latency_count += 1;
            }
        }

        EnhancedStats {
            total_records: records.len(),
            category_distribution,
            target_distribution,
            outcomes_recorded,
            success_rate: if outcomes_recorded > 0 {
                successes as f64 / outcomes_recorded as f64
            } else {
                0.0
            },
            average_latency_ms: if latency_count > 0 {
                latency_sum as f64 / latency_count as f64
            } else {
                0.0
            },
        }
    }

    /// Serialize the full log as pretty JSON
    pub fn export_json(&self) -> Result<String, ExportError> {
        let records = self.lock();
        Ok(serde_json::to_string_pretty(&*records)?)
    }

    /// Serialize the full log as CSV
    pub fn export_csv(&self) -> String {
        let records = self.lock();
        let mut csv = String::from(
            "timestamp,category,complexity,query_type,target,confidence,\
             handled_by,success,tool_calls_used,latency_ms\n",
        );
        for record in records.iter() {
            let (handled_by, success, tool_calls) = match &record.actual_outcome {
                Some(outcome) => (
                    outcome.handled_by.as_str(),
                    outcome.success.to_string(),
                    outcome.tool_calls_used.to_string(),
                ),
                None => ("", String::new(), String::new()),
            };
            csv.push_str(&format!(
                "{},{},{},{:?},{},{:.3},{},{},{},{}\n",
                record.timestamp.to_rfc3339(),
                record.classification.category,
                record.classification.complexity,
                record.classification.query_type,
                csv_field(&record.decision.target),
                record.decision.confidence,
                csv_field(handled_by),
                success,
                tool_calls,
                record
                    .latency_ms
                    .map(|l| l.to_string())
                    .unwrap_or_default(),
            ));
        }
        csv
    }

    /// Write the log to `path`; the format follows the file extension
    pub fn export_to_file(&self, path: &Path) -> Result<(), ExportError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let content = match extension {
            "json" => self.export_json()?,
            "csv" => self.export_csv(),
            other => return Err(ExportError::UnsupportedFormat(other.to_string())),
        };
        std::fs::write(path, content)?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RoutingRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// RFC 4180 quoting for free-form fields (`target`, `handled_by` are
/// host-supplied strings)
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::router::{Classified, QueryClassifier};

    fn classify_and_route(query: &str) -> (QueryClassification, RoutingDecision) {
        let classified: Classified = QueryClassifier::classify(query, &[]);
        (classified.classification, QueryClassifier::route(&classified))
    }

    fn outcome(handled_by: &str, success: bool, tool_calls: u32) -> ObservedOutcome {
        ObservedOutcome {
            handled_by: handled_by.to_string(),
            tool_calls_used: tool_calls,
            turns_used: 1,
            success,
        }
    }

    #[test]
    fn outcomes_feed_accuracy_metrics() {
        let monitor = RoutingMonitor::new();

        let (classification, decision) = classify_and_route("fix the bug in parser.go");
        let target = decision.target.clone();
        let index = monitor.record(classification, decision);
        monitor.record_outcome(index, outcome(&target, true, 1), 120);

        let (classification, decision) = classify_and_route("hello");
        let index = monitor.record(classification, decision);
        // Predicted general, actually needed the code worker.
        monitor.record_outcome(index, outcome("code-worker", true, 3), 80);

        let metrics = monitor.accuracy_metrics();
        assert_eq!(metrics.evaluated, 2);
        let code = metrics.per_category[&QueryCategory::Code];
        assert_eq!(code.predicted, 1);
        assert_eq!(code.correct, 1);
        assert!((code.precision - 1.0).abs() < f64::EPSILON);
        let general = metrics.per_category[&QueryCategory::General];
        assert_eq!(general.predicted, 1);
        assert_eq!(general.correct, 0);
    }

    #[test]
    fn stats_aggregate_distribution_and_latency() {
        let monitor = RoutingMonitor::new();
        for query in ["hello", "fix the bug in parser.go", "review the pull request"] {
            let (classification, decision) = classify_and_route(query);
            let index = monitor.record(classification, decision);
            monitor.record_outcome(index, outcome("general-worker", true, 0), 100);
        }

        let stats = monitor.enhanced_stats();
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.outcomes_recorded, 3);
        assert!((stats.success_rate - 1.0).abs() < f64::EPSILON);
        assert!((stats.average_latency_ms - 100.0).abs() < f64::EPSILON);
        assert_eq!(stats.category_distribution.values().sum::<usize>(), 3);
    }

    #[test]
    fn export_round_trips_and_rejects_unknown_formats() {
        let monitor = RoutingMonitor::new();
        let (classification, decision) = classify_and_route("hello");
        monitor.record(classification, decision);

        let json = monitor.export_json().unwrap();
        let parsed: Vec<RoutingRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);

        let csv = monitor.export_csv();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.starts_with("timestamp,"));

        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("log.json");
        monitor.export_to_file(&json_path).unwrap();
        assert!(json_path.exists());

        let err = monitor
            .export_to_file(&dir.path().join("log.parquet"))
            .unwrap_err();
        assert!(matches!(err, ExportError::UnsupportedFormat(_)));
    }

    #[test]
    fn csv_quotes_fields_with_separators() {
        let monitor = RoutingMonitor::new();
        let (classification, decision) = classify_and_route("hello");
        let index = monitor.record(classification, decision);
        monitor.record_outcome(index, outcome("worker \"a\", pool 1", true, 0), 10);

        let csv = monitor.export_csv();
        // the embedded comma must not add a column
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.contains("\"worker \"\"a\"\", pool 1\""));
    }
}
