//! ACP session notification types.
//!
//! The subset of the Agent Client Protocol the engine consumes: session
//! updates announcing tool calls and streaming their argument fragments.
//! Wire names follow the protocol's snake_case JSON.

use serde::{Deserialize, Serialize};

/// Lifecycle status of an external agent's tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    /// The call is running; more updates will follow.
    InProgress,
    /// The call finished successfully.
    Completed,
    /// The call finished with an error.
    Failed,
}

impl ToolCallStatus {
    /// Whether this status ends the call's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// A content block carried on a tool-call update.
///
/// Only textual fragments participate in argument reassembly; other block
/// kinds are preserved for forward compatibility and ignored by the mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentChunk {
    /// A textual argument fragment.
    Text { text: String },
    /// Any other block kind; skipped during reassembly.
    #[serde(other)]
    Other,
}

/// First announcement of a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallNotification {
    /// External tool-call id (unique only within its session)
    pub tool_call_id: String,
    /// Human-readable tool title, used as the tool name downstream
    pub title: String,
    /// Initial status, if the agent reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Initial content fragments, if any
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentChunk>,
}

/// Incremental update for a previously announced tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallUpdateNotification {
    /// External tool-call id
    pub tool_call_id: String,
    /// New status, if it changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolCallStatus>,
    /// Argument fragments appended by this update
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentChunk>,
}

/// The session update payload variants the engine maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sessionUpdate", rename_all = "snake_case")]
pub enum SessionUpdate {
    /// A new tool call.
    ToolCall(ToolCallNotification),
    /// An update to an in-flight tool call.
    ToolCallUpdate(ToolCallUpdateNotification),
}

/// One ACP session notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionNotification {
    /// The ACP session the update belongs to
    pub session_id: String,
    /// The update payload
    #[serde(flatten)]
    pub update: SessionUpdate,
}

impl SessionNotification {
    /// Convenience constructor for a `tool_call` notification.
    pub fn tool_call(session_id: &str, tool_call_id: &str, title: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            update: SessionUpdate::ToolCall(ToolCallNotification {
                tool_call_id: tool_call_id.to_string(),
                title: title.to_string(),
                status: None,
                content: Vec::new(),
            }),
        }
    }

    /// Convenience constructor for a `tool_call_update` carrying one text
    /// fragment and an optional status.
    pub fn tool_call_update(
        session_id: &str,
        tool_call_id: &str,
        fragment: Option<&str>,
        status: Option<ToolCallStatus>,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            update: SessionUpdate::ToolCallUpdate(ToolCallUpdateNotification {
                tool_call_id: tool_call_id.to_string(),
                status,
                content: fragment
                    .map(|text| {
                        vec![ContentChunk::Text {
                            text: text.to_string(),
                        }]
                    })
                    .unwrap_or_default(),
            }),
        }
    }
}
