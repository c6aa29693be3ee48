//! Destructive message-history pruning
//!
//! Three independent transforms over a message sequence, composed by
//! [`apply_pruning`]. Truncation runs before clearing because it preserves
//! partial information at lower cost; deduplication runs last because it
//! changes message count and must not interfere with index-based aging.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;

use crate::config::PruningConfig;
use crate::config::constants::context;
use crate::llm::provider::{Message, MessageRole};

/// Counts reported by one pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningStats {
    pub tool_results_truncated: usize,
    pub tool_results_cleared: usize,
    pub system_messages_removed: usize,
}

impl PruningStats {
    pub fn total(&self) -> usize {
        self.tool_results_truncated + self.tool_results_cleared + self.system_messages_removed
    }
}

/// Shorten oversized tool results to `max_len` plus a fixed suffix.
///
/// Returns the number of messages truncated. Each truncated message is
/// annotated with its original length.
pub fn truncate_tool_results(messages: &mut [Message], max_len: usize) -> usize {
    let mut truncated = 0;
    for message in messages.iter_mut() {
        if message.role != MessageRole::Tool || message.content.len() <= max_len {
            continue;
        }
        let original_length = message.content.len();
        let cut = floor_char_boundary(&message.content, max_len);
        message.content.truncate(cut);
        message.content.push_str(context::TRUNCATION_SUFFIX);
        annotate(message, "truncated", json!(true));
        annotate(message, "original_length", json!(original_length));
        truncated += 1;
    }
    truncated
}

/// Replace tool results older than `turn_threshold` messages with a placeholder.
///
/// A tool message at index `i` is aged out when `(len - i) > turn_threshold`.
pub fn clear_aged_tool_results(messages: &mut [Message], turn_threshold: usize) -> usize {
    let len = messages.len();
    let mut cleared = 0;
    for (index, message) in messages.iter_mut().enumerate() {
        if message.role != MessageRole::Tool {
            continue;
        }
        if len - index <= turn_threshold {
            continue;
        }
        if message.content == context::CLEARED_PLACEHOLDER {
            continue;
        }
        let original_length = message.content.len();
        message.content = context::CLEARED_PLACEHOLDER.to_string();
        annotate(message, "cleared", json!(true));
        annotate(message, "original_length", json!(original_length));
        cleared += 1;
    }
    cleared
}

/// Keep only the most recent system message per derived message type.
///
/// The type of a system message is the first key of its content parsed as a
/// JSON object, or `"default"` when the content is not a JSON object. The
/// relative order of all non-system messages is preserved exactly.
pub fn deduplicate_system_messages(messages: &mut Vec<Message>) -> usize {
    let mut seen: HashSet<String> = HashSet::new();
    let mut keep = vec![true; messages.len()];
    let mut removed = 0;

    for (index, message) in messages.iter().enumerate().rev() {
        if message.role != MessageRole::System {
            continue;
        }
        let message_type = derive_system_message_type(&message.content);
        if !seen.insert(message_type) {
            keep[index] = false;
            removed += 1;
        }
    }

    if removed > 0 {
        let mut index = 0;
        messages.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
    }
    removed
}

/// Run truncate → clear → (optional) dedupe in that fixed order
pub fn apply_pruning(messages: &mut Vec<Message>, config: &PruningConfig) -> PruningStats {
    let tool_results_truncated = truncate_tool_results(messages, config.tool_result_max_len);
    let tool_results_cleared =
        clear_aged_tool_results(messages, config.tool_result_turn_threshold);
    let system_messages_removed = if config.deduplicate_system_messages {
        deduplicate_system_messages(messages)
    } else {
        0
    };

    PruningStats {
        tool_results_truncated,
        tool_results_cleared,
        system_messages_removed,
    }
}

fn derive_system_message_type(content: &str) -> String {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => map
            .keys()
            .next()
            .cloned()
            .unwrap_or_else(|| "default".to_string()),
        _ => "default".to_string(),
    }
}

fn annotate(message: &mut Message, key: &str, value: Value) {
    match message.metadata.as_mut() {
        Some(Value::Object(map)) => {
            map.insert(key.to_string(), value);
        }
        _ => {
            message.metadata = Some(json!({ key: value }));
        }
    }
}

/// Largest byte index `<= max` that falls on a char boundary
fn floor_char_boundary(text: &str, max: usize) -> usize {
    if max >= text.len() {
        return text.len();
    }
    let mut cut = max;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_message(content: &str) -> Message {
        Message::tool_result("call_1", "search", content)
    }

    #[test]
    fn truncation_bounds_content_length() {
        let mut messages = vec![tool_message(&"x".repeat(100)), Message::user("short")];
        let count = truncate_tool_results(&mut messages, 10);

        assert_eq!(count, 1);
        assert!(messages[0].content.len() <= 10 + context::TRUNCATION_SUFFIX.len());
        assert!(messages[0].content.ends_with(context::TRUNCATION_SUFFIX));
        assert_eq!(messages[0].metadata.as_ref().unwrap()["original_length"], 100);
        // non-tool messages untouched
        assert_eq!(messages[1].content, "short");
    }

    #[test]
    fn truncation_respects_utf8_boundaries() {
        let mut messages = vec![tool_message(&"é".repeat(20))]; // 2 bytes per char
        truncate_tool_results(&mut messages, 5);
        assert!(messages[0].content.starts_with("éé"));
    }

    #[test]
    fn aging_clears_only_old_tool_results() {
        let mut messages: Vec<Message> = (0..6)
            .map(|i| tool_message(&format!("result {i}")))
            .collect();
        let cleared = clear_aged_tool_results(&mut messages, 3);

        // len - i > 3 holds for indices 0, 1, 2
        assert_eq!(cleared, 3);
        assert_eq!(messages[0].content, context::CLEARED_PLACEHOLDER);
        assert_eq!(messages[2].content, context::CLEARED_PLACEHOLDER);
        assert_eq!(messages[3].content, "result 3");
    }

    #[test]
    fn dedupe_keeps_most_recent_per_type() {
        let mut messages = vec![
            Message::system(r#"{"memory": "old"}"#),
            Message::user("hello"),
            Message::system(r#"{"memory": "new"}"#),
            Message::system("plain text"),
            Message::system("another plain"),
        ];
        let removed = deduplicate_system_messages(&mut messages);

        assert_eq!(removed, 2);
        let system_contents: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(
            system_contents,
            vec![r#"{"memory": "new"}"#, "another plain"]
        );
        // non-system order intact
        assert_eq!(messages[0].content, "hello");
    }

    #[test]
    fn apply_pruning_never_increases_count_or_reorders() {
        let mut messages = vec![
            Message::system(r#"{"memory": 1}"#),
            tool_message(&"y".repeat(5000)),
            Message::user("first"),
            Message::assistant("second"),
            Message::system(r#"{"memory": 2}"#),
        ];
        let original_count = messages.len();
        let stats = apply_pruning(&mut messages, &PruningConfig::default());

        assert!(messages.len() <= original_count);
        assert_eq!(stats.tool_results_truncated, 1);
        assert_eq!(stats.system_messages_removed, 1);
        let non_system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| m.role.as_str())
            .collect();
        assert_eq!(non_system, vec!["tool", "user", "assistant"]);
    }
}
