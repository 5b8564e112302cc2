//! ACP module - external agent protocol integration
//!
//! Translates Agent Client Protocol session notifications into the
//! engine's internal [`StreamEvent`] vocabulary so downstream components
//! never care whether a tool call came from a model provider or an
//! external coding agent. Also hosts the sandboxed filesystem handler the
//! agent's `fs/read_text_file` / `fs/write_text_file` requests are served
//! by.
//!
//! # Example
//!
//! ```
//! use femtoloop::acp::{AcpContentMapper, SessionNotification, ToolCallStatus};
//! use femtoloop::events::StreamEvent;
//!
//! let mapper = AcpContentMapper::new();
//!
//! let events = mapper.map_notification(&SessionNotification::tool_call(
//!     "sess-1", "tc-1", "Read File",
//! ));
//! assert!(matches!(&events[0], StreamEvent::ToolCallStart { name, .. } if name == "Read File"));
//!
//! let events = mapper.map_notification(&SessionNotification::tool_call_update(
//!     "sess-1", "tc-1", Some("{\"path\":\"/tmp\"}"), Some(ToolCallStatus::Completed),
//! ));
//! assert!(matches!(events.last(), Some(StreamEvent::ToolCallEnd { .. })));
//! ```

pub mod fs;
pub mod types;

pub use fs::{AcpFsHandler, FileChangeNotice};
pub use types::{
    ContentChunk, SessionNotification, SessionUpdate, ToolCallNotification, ToolCallStatus,
    ToolCallUpdateNotification,
};

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::events::StreamEvent;

/// Reassembly state for one external tool call.
struct ToolCallAccumulator {
    title: String,
    status: ToolCallStatus,
    arguments: String,
}

/// Stateful translator from ACP notifications to stream events.
///
/// One instance per process. All state is keyed by the composite
/// `(session_id, tool_call_id)` pair: two sessions may reuse the same
/// external tool-call id without cross-contaminating each other.
pub struct AcpContentMapper {
    state: Mutex<HashMap<(String, String), ToolCallAccumulator>>,
}

impl AcpContentMapper {
    /// Create a mapper with no in-flight calls.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Translate one notification into zero or more stream events.
    ///
    /// - First sight of a `tool_call` emits `ToolCallStart` and seeds the
    ///   accumulator; any initial fragments follow as chunks.
    /// - A `tool_call_update` appends each textual fragment to the
    ///   accumulator and emits it as a `ToolCallChunk` (the fragment, not
    ///   the accumulation, preserving streaming semantics downstream).
    /// - A terminal status emits `ToolCallEnd` carrying the complete
    ///   accumulation after the final chunk, then drops the state.
    pub fn map_notification(&self, notification: &SessionNotification) -> Vec<StreamEvent> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let session_id = notification.session_id.as_str();

        match &notification.update {
            SessionUpdate::ToolCall(call) => {
                let key = (session_id.to_string(), call.tool_call_id.clone());
                let mut events = Vec::new();

                if !state.contains_key(&key) {
                    debug!(
                        session_id = %session_id,
                        tool_call_id = %call.tool_call_id,
                        title = %call.title,
                        "External tool call started"
                    );
                    state.insert(
                        key.clone(),
                        ToolCallAccumulator {
                            title: call.title.clone(),
                            status: call.status.unwrap_or(ToolCallStatus::InProgress),
                            arguments: String::new(),
                        },
                    );
                    events.push(StreamEvent::ToolCallStart {
                        id: call.tool_call_id.clone(),
                        name: call.title.clone(),
                    });
                }

                events.extend(Self::ingest(
                    &mut state,
                    &key,
                    &call.content,
                    call.status,
                ));
                events
            }
            SessionUpdate::ToolCallUpdate(update) => {
                let key = (session_id.to_string(), update.tool_call_id.clone());
                let mut events = Vec::new();

                // An update for an unannounced call still needs a start so
                // downstream consumers see a well-formed sequence.
                if !state.contains_key(&key) {
                    warn!(
                        session_id = %session_id,
                        tool_call_id = %update.tool_call_id,
                        "tool_call_update for unannounced call"
                    );
                    state.insert(
                        key.clone(),
                        ToolCallAccumulator {
                            title: update.tool_call_id.clone(),
                            status: ToolCallStatus::InProgress,
                            arguments: String::new(),
                        },
                    );
                    events.push(StreamEvent::ToolCallStart {
                        id: update.tool_call_id.clone(),
                        name: update.tool_call_id.clone(),
                    });
                }

                events.extend(Self::ingest(
                    &mut state,
                    &key,
                    &update.content,
                    update.status,
                ));
                events
            }
        }
    }

    /// Append fragments, apply a status change, and emit the resulting
    /// chunk/end events for the call at `key`.
    fn ingest(
        state: &mut HashMap<(String, String), ToolCallAccumulator>,
        key: &(String, String),
        content: &[ContentChunk],
        status: Option<ToolCallStatus>,
    ) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        let Some(accumulator) = state.get_mut(key) else {
            return events;
        };

        for chunk in content {
            if let ContentChunk::Text { text } = chunk {
                accumulator.arguments.push_str(text);
                events.push(StreamEvent::ToolCallChunk {
                    id: key.1.clone(),
                    fragment: text.clone(),
                });
            }
        }

        if let Some(status) = status {
            accumulator.status = status;
            if status.is_terminal() {
                let finished = state.remove(key);
                if let Some(finished) = finished {
                    debug!(
                        session_id = %key.0,
                        tool_call_id = %key.1,
                        status = ?status,
                        "External tool call finished"
                    );
                    events.push(StreamEvent::ToolCallEnd {
                        id: key.1.clone(),
                        complete_arguments: finished.arguments,
                    });
                }
            }
        }
        events
    }

    /// Title of an in-flight call, if tracked. Test/diagnostic helper.
    pub fn in_flight_title(&self, session_id: &str, tool_call_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .get(&(session_id.to_string(), tool_call_id.to_string()))
            .map(|a| a.title.clone())
    }

    /// Number of in-flight calls across all sessions.
    pub fn in_flight_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.len()
    }

    /// Drop all state for one session (session closed or agent restarted).
    pub fn clear_session(&self, session_id: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.retain(|(session, _), _| session != session_id);
    }

    /// Drop all state.
    pub fn clear_all(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.clear();
    }
}

impl Default for AcpContentMapper {
    fn default() -> Self {
        Self::new()
    }
}
