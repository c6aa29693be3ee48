//! Human-in-the-loop confirmation state machine
//!
//! Tracks each proposed tool call through
//! `proposed -> approved|rejected -> executing -> completed|failed`.
//! `rejected`, `completed`, and `failed` are terminal. Invalid transitions
//! are programming errors, reported through [`StateError`] and leaving state
//! untouched, so callers can tell them apart from business outcomes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A proposed tool invocation awaiting approval.
///
/// Created by the routing/LLM layer, never by the executor; lives only for
/// the duration of one turn's tool phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfirmation {
    pub id: String,
    pub tool_name: String,
    pub arguments: Value,
}

impl ToolConfirmation {
    pub fn new(id: impl Into<String>, tool_name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationState {
    Proposed,
    Approved,
    Rejected,
    Executing,
    Completed,
    Failed,
}

impl ConfirmationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ConfirmationState::Rejected
                | ConfirmationState::Completed
                | ConfirmationState::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationState::Proposed => "proposed",
            ConfirmationState::Approved => "approved",
            ConfirmationState::Rejected => "rejected",
            ConfirmationState::Executing => "executing",
            ConfirmationState::Completed => "completed",
            ConfirmationState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConfirmationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// State-machine violations, distinguishable from business outcomes
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StateError {
    #[error("unknown confirmation id: {0}")]
    UnknownId(String),
    #[error("duplicate confirmation id: {0}")]
    DuplicateId(String),
    #[error("invalid transition for {id}: {from} -> {requested}")]
    InvalidTransition {
        id: String,
        from: ConfirmationState,
        requested: ConfirmationState,
    },
}

/// One tracked confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmationEntry {
    pub confirmation: ToolConfirmation,
    pub state: ConfirmationState,
}

/// Per-turn confirmation tracker
#[derive(Debug, Default)]
pub struct ConfirmationStateMachine {
    entries: HashMap<String, ConfirmationEntry>,
    // preserves proposal order for batch operations and listings
    order: Vec<String>,
}

impl ConfirmationStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a proposed tool call
    pub fn propose(&mut self, confirmation: ToolConfirmation) -> Result<(), StateError> {
        if self.entries.contains_key(&confirmation.id) {
            return Err(StateError::DuplicateId(confirmation.id));
        }
        self.order.push(confirmation.id.clone());
        self.entries.insert(
            confirmation.id.clone(),
            ConfirmationEntry {
                confirmation,
                state: ConfirmationState::Proposed,
            },
        );
        Ok(())
    }

    pub fn approve(&mut self, id: &str) -> Result<(), StateError> {
        self.transition(id, ConfirmationState::Approved)
    }

    pub fn reject(&mut self, id: &str) -> Result<(), StateError> {
        self.transition(id, ConfirmationState::Rejected)
    }

    pub fn begin_execution(&mut self, id: &str) -> Result<(), StateError> {
        self.transition(id, ConfirmationState::Executing)
    }

    pub fn complete(&mut self, id: &str) -> Result<(), StateError> {
        self.transition(id, ConfirmationState::Completed)
    }

    pub fn fail(&mut self, id: &str) -> Result<(), StateError> {
        self.transition(id, ConfirmationState::Failed)
    }

    /// Approve every currently-proposed entry.
    ///
    /// Atomic with respect to the proposed set at the time of the call;
    /// returns the ids that moved to `approved`, in proposal order.
    pub fn approve_all(&mut self) -> Vec<String> {
        self.batch_transition(ConfirmationState::Approved)
    }

    /// Reject every currently-proposed entry
    pub fn reject_all(&mut self) -> Vec<String> {
        self.batch_transition(ConfirmationState::Rejected)
    }

    pub fn state_of(&self, id: &str) -> Option<ConfirmationState> {
        self.entries.get(id).map(|entry| entry.state)
    }

    pub fn get(&self, id: &str) -> Option<&ConfirmationEntry> {
        self.entries.get(id)
    }

    /// Entries currently in `state`, in proposal order
    pub fn in_state(&self, state: ConfirmationState) -> Vec<&ConfirmationEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|entry| entry.state == state)
            .collect()
    }

    /// Approved confirmations ready for the batch executor, in proposal order
    pub fn approved_confirmations(&self) -> Vec<ToolConfirmation> {
        self.in_state(ConfirmationState::Approved)
            .into_iter()
            .map(|entry| entry.confirmation.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn batch_transition(&mut self, requested: ConfirmationState) -> Vec<String> {
        let proposed: Vec<String> = self
            .order
            .iter()
            .filter(|id| {
                self.entries
                    .get(*id)
                    .is_some_and(|entry| entry.state == ConfirmationState::Proposed)
            })
            .cloned()
            .collect();
        for id in &proposed {
            if let Some(entry) = self.entries.get_mut(id) {
                entry.state = requested;
            }
        }
        proposed
    }

    fn transition(&mut self, id: &str, requested: ConfirmationState) -> Result<(), StateError> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StateError::UnknownId(id.to_string()))?;

        let allowed = matches!(
            (entry.state, requested),
            (ConfirmationState::Proposed, ConfirmationState::Approved)
                | (ConfirmationState::Proposed, ConfirmationState::Rejected)
                | (ConfirmationState::Approved, ConfirmationState::Executing)
                | (ConfirmationState::Executing, ConfirmationState::Completed)
                | (ConfirmationState::Executing, ConfirmationState::Failed)
        );

        if !allowed {
            return Err(StateError::InvalidTransition {
                id: id.to_string(),
                from: entry.state,
                requested,
            });
        }

        entry.state = requested;
        Ok(())
    }
}
