//! Conversation types: messages, roles, tool calls, and per-conversation
//! settings (execution mode, workspace bindings).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// How a conversation executes tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Plain chat, no workspace.
    Chat,
    /// Built-in agent with an engine-managed workspace directory.
    Agent,
    /// External ACP agent that owns its own working directories.
    AcpAgent,
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Chat => write!(f, "chat"),
            Self::Agent => write!(f, "agent"),
            Self::AcpAgent => write!(f, "acp_agent"),
        }
    }
}

/// Persisted per-conversation settings.
///
/// Created on first message; the execution mode and workspace are resolved
/// lazily on first tool use and written back once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Conversation identifier.
    pub conversation_id: String,
    /// Tool execution mode for this conversation.
    pub mode: ExecutionMode,
    /// Active model identifier.
    pub model_id: String,
    /// Active provider identifier.
    pub provider_id: String,
    /// Names of tools enabled for this conversation.
    pub enabled_tools: Vec<String>,
    /// Engine-managed workspace (agent mode only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    /// Per-model working directories owned by an external ACP agent.
    #[serde(default)]
    pub acp_work_dirs: HashMap<String, PathBuf>,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the settings were last modified
    pub updated_at: DateTime<Utc>,
}

impl ConversationSettings {
    /// Create settings for a new conversation in the given mode.
    pub fn new(conversation_id: &str, mode: ExecutionMode) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.to_string(),
            mode,
            model_id: String::new(),
            provider_id: String::new(),
            enabled_tools: Vec::new(),
            workspace_path: None,
            acp_work_dirs: HashMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Record the engine-managed workspace path.
    pub fn set_workspace_path(&mut self, path: PathBuf) {
        self.workspace_path = Some(path);
        self.updated_at = Utc::now();
    }

    /// Record an ACP agent's working directory for one model.
    pub fn set_acp_work_dir(&mut self, model_id: &str, path: PathBuf) {
        self.acp_work_dirs.insert(model_id.to_string(), path);
        self.updated_at = Utc::now();
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompts and instructions
    System,
    /// Messages from the user
    User,
    /// Messages from the model
    Assistant,
    /// Results from tool executions
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A structured tool call carried on an assistant message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the tool to call
    pub name: String,
    /// JSON-encoded arguments for the tool
    pub arguments: String,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: &str, name: &str, arguments: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }
    }
}

/// A single message in a conversation.
///
/// The optional `tool_calls` / `tool_call_id` fields carry the
/// function-calling pairing: an assistant message proposing calls, and a
/// tool message answering one call by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender
    pub role: Role,
    /// The text content of the message
    pub content: String,
    /// Tool calls proposed by the assistant (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message answers (tool results only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Create a new user message.
    ///
    /// # Example
    /// ```
    /// use femtoloop::session::{Message, Role};
    ///
    /// let msg = Message::user("Hello!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a new system message.
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Create a tool result message answering one tool call by id.
    ///
    /// # Example
    /// ```
    /// use femtoloop::session::Message;
    ///
    /// let msg = Message::tool_result("call_123", "done");
    /// assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
    /// ```
    pub fn tool_result(tool_call_id: &str, content: &str) -> Self {
        Self {
            role: Role::Tool,
            content: content.to_string(),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.to_string()),
        }
    }

    /// Create an assistant message carrying structured tool calls.
    pub fn assistant_with_tools(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Check if this message carries tool calls.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls
            .as_ref()
            .map(|tc| !tc.is_empty())
            .unwrap_or(false)
    }

    /// Check if this is a tool result message.
    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool && self.tool_call_id.is_some()
    }
}
