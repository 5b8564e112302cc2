//! Tools module - tool definitions, backends, and routing
//!
//! Tools come from four kinds of backends: MCP servers, an external ACP
//! agent, browser automation, and built-ins. Each backend registers its
//! tool names with the [`ToolRegistry`]; the router maps a proposed tool
//! name back to the owning backend, and [`merge_definitions`] aggregates
//! definition sets for advertisement to the model without duplicates.
//!
//! # Example
//!
//! ```
//! use femtoloop::tools::{RegistryEntry, ToolRegistry, ToolSource};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(RegistryEntry::new("read_file", ToolSource::Builtin));
//!
//! let route = registry.resolve_tool_route("read_file");
//! assert_eq!(route.target, ToolSource::Builtin);
//! assert!(route.permission.is_none());
//! ```

mod registry;

pub use registry::{PermissionType, ToolRegistry, ToolRoute};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::error::Result;

/// The backend kind a tool belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    /// A Model Context Protocol server.
    Mcp,
    /// An external ACP coding agent.
    Agent,
    /// Browser automation.
    Browser,
    /// A built-in local function.
    Builtin,
}

impl ToolSource {
    /// Aggregation priority: lower wins on duplicate tool names, so an
    /// agent or browser tool shadows a generic MCP tool of the same name.
    fn priority(self) -> u8 {
        match self {
            ToolSource::Agent => 0,
            ToolSource::Browser => 1,
            ToolSource::Builtin => 2,
            ToolSource::Mcp => 3,
        }
    }
}

impl std::fmt::Display for ToolSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mcp => write!(f, "mcp"),
            Self::Agent => write!(f, "agent"),
            Self::Browser => write!(f, "browser"),
            Self::Builtin => write!(f, "builtin"),
        }
    }
}

/// One registered tool name and its owning backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Tool name as advertised to the model
    pub name: String,
    /// Owning backend
    pub source: ToolSource,
}

impl RegistryEntry {
    /// Create a registry entry.
    pub fn new(name: &str, source: ToolSource) -> Self {
        Self {
            name: name.to_string(),
            source,
        }
    }
}

/// Definition of a tool advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (unique within an advertisement set)
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

/// Execution context handed to a backend for one invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeContext {
    /// The conversation the invocation belongs to
    pub conversation_id: String,
    /// Resolved working directory, when the conversation has one
    pub workspace: Option<PathBuf>,
}

impl InvokeContext {
    /// Create a context for a conversation.
    pub fn new(conversation_id: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            workspace: None,
        }
    }

    /// Set the working directory.
    pub fn with_workspace(mut self, workspace: PathBuf) -> Self {
        self.workspace = Some(workspace);
        self
    }
}

/// Capability interface implemented once per backend kind.
///
/// The router's [`ToolRoute::target`] selects which implementation an
/// invocation is dispatched to.
#[async_trait]
pub trait ToolBackend: Send + Sync {
    /// The backend kind this implementation serves.
    fn source(&self) -> ToolSource;

    /// Definitions of the tools this backend currently offers.
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Invoke a tool and return its serialized result.
    ///
    /// # Errors
    /// Returns a tool error on execution failure; unknown names fail here,
    /// not at routing time.
    async fn invoke(&self, name: &str, args: Value, ctx: &InvokeContext) -> Result<String>;
}

/// Aggregate definition sets from several backends into one advertisement
/// set with unique names.
///
/// On a name collision the higher-priority source wins (agent and browser
/// shadow builtin, which shadows mcp), so the model never sees duplicate
/// tool names.
pub fn merge_definitions(sets: Vec<(ToolSource, Vec<ToolDefinition>)>) -> Vec<ToolDefinition> {
    let mut ordered = sets;
    ordered.sort_by_key(|(source, _)| source.priority());

    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for (_, definitions) in ordered {
        for definition in definitions {
            if seen.insert(definition.name.clone()) {
                merged.push(definition);
            }
        }
    }
    merged
}

/// A trivial built-in backend that echoes its arguments back.
///
/// Useful for wiring tests and as the smallest possible backend example.
pub struct EchoBackend;

#[async_trait]
impl ToolBackend for EchoBackend {
    fn source(&self) -> ToolSource {
        ToolSource::Builtin
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "echo",
            "Echoes back the provided message",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "The message to echo" }
                },
                "required": ["message"]
            }),
        )]
    }

    async fn invoke(&self, _name: &str, args: Value, _ctx: &InvokeContext) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("(no message)");
        Ok(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition::new(name, "test tool", json!({"type": "object"}))
    }

    #[test]
    fn test_tool_source_display() {
        assert_eq!(ToolSource::Mcp.to_string(), "mcp");
        assert_eq!(ToolSource::Agent.to_string(), "agent");
        assert_eq!(ToolSource::Browser.to_string(), "browser");
        assert_eq!(ToolSource::Builtin.to_string(), "builtin");
    }

    #[test]
    fn test_tool_source_serde() {
        let json = serde_json::to_string(&ToolSource::Browser).unwrap();
        assert_eq!(json, "\"browser\"");
    }

    #[test]
    fn test_merge_keeps_unique_names() {
        let merged = merge_definitions(vec![
            (ToolSource::Mcp, vec![def("search"), def("fetch")]),
            (ToolSource::Builtin, vec![def("read_file")]),
        ]);
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_agent_shadows_mcp() {
        let mcp_def = ToolDefinition::new("edit", "mcp edit", json!({"type": "object"}));
        let agent_def = ToolDefinition::new("edit", "agent edit", json!({"type": "object"}));

        let merged = merge_definitions(vec![
            (ToolSource::Mcp, vec![mcp_def]),
            (ToolSource::Agent, vec![agent_def.clone()]),
        ]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0], agent_def);
    }

    #[test]
    fn test_merge_browser_shadows_mcp_but_not_agent() {
        let merged = merge_definitions(vec![
            (
                ToolSource::Browser,
                vec![ToolDefinition::new("open", "browser", json!({}))],
            ),
            (
                ToolSource::Agent,
                vec![ToolDefinition::new("open", "agent", json!({}))],
            ),
            (
                ToolSource::Mcp,
                vec![ToolDefinition::new("open", "mcp", json!({}))],
            ),
        ]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].description, "agent");
    }

    #[tokio::test]
    async fn test_echo_backend() {
        let backend = EchoBackend;
        assert_eq!(backend.source(), ToolSource::Builtin);
        assert_eq!(backend.definitions()[0].name, "echo");

        let ctx = InvokeContext::new("conv-1");
        let result = backend
            .invoke("echo", json!({"message": "hello"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result, "hello");

        let empty = backend.invoke("echo", json!({}), &ctx).await.unwrap();
        assert_eq!(empty, "(no message)");
    }

    #[test]
    fn test_invoke_context_builder() {
        let ctx = InvokeContext::new("conv-9").with_workspace(PathBuf::from("/w"));
        assert_eq!(ctx.conversation_id, "conv-9");
        assert_eq!(ctx.workspace, Some(PathBuf::from("/w")));
    }
}
