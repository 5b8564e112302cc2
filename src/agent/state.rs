//! Per-pass loop state and the stream-assembly state machine.
//!
//! One [`LoopState`] exists per generation pass. It accumulates text and
//! reasoning deltas, reassembles fragmented tool-call arguments into
//! [`ToolCallRecord`]s, tracks cumulative usage, and records whether the
//! model asked for another turn. The state is owned by the orchestrator
//! for the duration of the pass and discarded on completion, error, or
//! cancellation.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{StopReason, StreamEvent, Usage};
use crate::session::Message;

/// Lifecycle status of a tool call inside the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// Proposed by the model, not yet executed.
    Pending,
    /// Currently executing.
    Running,
    /// Executed successfully.
    Completed,
    /// Execution failed; the error is the tool result.
    Failed,
    /// Blocked on a human permission decision.
    PendingApproval,
    /// Aborted by the loop's cancellation signal.
    Cancelled,
}

/// One tool call's full lifecycle inside a pass.
///
/// `response` holds the in-context result (possibly an offload stub);
/// `raw_response` always carries the unabridged payload for listeners
/// that need user-visible fidelity regardless of context-window economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Tool call id as proposed by the model (may be empty upstream)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Raw argument string, reassembled from fragments
    pub arguments: String,
    /// In-context serialized result (stub when offloaded)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Out-of-band unabridged result
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
    /// Current lifecycle status
    pub status: ToolCallStatus,
}

impl ToolCallRecord {
    /// Create a pending record.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
            response: None,
            raw_response: None,
            status: ToolCallStatus::Pending,
        }
    }
}

/// An in-flight tool call whose arguments are still streaming in.
#[derive(Debug, Clone)]
struct PendingFragments {
    name: String,
    arguments: String,
}

/// State for one generation pass.
#[derive(Debug)]
pub struct LoopState {
    /// Unique id for this pass
    pub loop_id: String,
    /// The conversation this pass belongs to
    pub conversation_id: String,
    /// Messages accumulated during the pass (tool pairs appended here)
    pub messages: Vec<Message>,
    /// Tool calls executed so far in this conversation turn
    pub tool_call_count: usize,
    /// Whether the model asked for another generation pass
    pub needs_continuation: bool,
    /// Accumulated assistant text
    pub text: String,
    /// Accumulated reasoning text
    pub reasoning: String,
    /// Cumulative token usage
    pub usage: Usage,
    /// Stop reason observed from the stream, if any
    pub stop_reason: Option<StopReason>,
    /// In-flight fragment assembly, keyed by tool-call id
    in_flight: HashMap<String, PendingFragments>,
    /// Completed calls ready for execution, in arrival order
    ready: Vec<ToolCallRecord>,
}

impl LoopState {
    /// Create state for a new pass over a conversation.
    pub fn new(conversation_id: &str) -> Self {
        Self {
            loop_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            messages: Vec::new(),
            tool_call_count: 0,
            needs_continuation: false,
            text: String::new(),
            reasoning: String::new(),
            usage: Usage::default(),
            stop_reason: None,
            in_flight: HashMap::new(),
            ready: Vec::new(),
        }
    }

    /// Fold one stream event into the pass state.
    ///
    /// Tool-call fragments accumulate per id; a `ToolCallEnd` moves the
    /// call to the ready queue with the event's complete argument string
    /// (authoritative over local accumulation when both are present).
    pub fn apply_event(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Text { text } => self.text.push_str(text),
            StreamEvent::Reasoning { text } => self.reasoning.push_str(text),
            StreamEvent::ToolCallStart { id, name } => {
                self.in_flight.insert(
                    id.clone(),
                    PendingFragments {
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
            }
            StreamEvent::ToolCallChunk { id, fragment } => {
                if let Some(pending) = self.in_flight.get_mut(id) {
                    pending.arguments.push_str(fragment);
                }
            }
            StreamEvent::ToolCallEnd {
                id,
                complete_arguments,
            } => {
                let name = self
                    .in_flight
                    .remove(id)
                    .map(|p| p.name)
                    .unwrap_or_else(|| id.clone());
                self.ready
                    .push(ToolCallRecord::new(id, &name, complete_arguments));
            }
            StreamEvent::Usage(usage) => self.usage.add(usage),
            StreamEvent::Stop { reason } => {
                self.stop_reason = Some(*reason);
                self.needs_continuation = *reason == StopReason::ToolUse;
            }
            StreamEvent::Error { .. }
            | StreamEvent::ImageData { .. }
            | StreamEvent::RateLimit { .. } => {}
        }
    }

    /// Whether completed tool calls are waiting for execution.
    pub fn has_ready_calls(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Take the ready calls, leaving the queue empty.
    pub fn take_ready_calls(&mut self) -> Vec<ToolCallRecord> {
        std::mem::take(&mut self.ready)
    }

    /// Number of tool calls still assembling fragments.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }
}
