//! Tool name registry and router.
//!
//! A pure in-memory mapping from tool name to owning backend, consulted
//! synchronously on every proposed call. Registration is last-write-wins
//! within a backend; collision policy across backends lives in the caller
//! that aggregates definition sets (see [`super::merge_definitions`]), not
//! here.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::{RegistryEntry, ToolSource};

/// Which permission gate an invocation must pass before execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionType {
    /// The tool executes shell commands; consult the command permission
    /// service first.
    Command,
}

/// Routing decision for one proposed tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRoute {
    /// Backend to dispatch the invocation to.
    pub target: ToolSource,
    /// Permission gate required before execution, if any.
    pub permission: Option<PermissionType>,
}

/// Registry of tool names and their owning backends.
///
/// Read-mostly: populated at startup per enabled backend, then consulted
/// concurrently across conversations.
pub struct ToolRegistry {
    entries: HashMap<String, RegistryEntry>,
    command_tools: HashSet<String>,
    default_target: ToolSource,
}

impl ToolRegistry {
    /// Create an empty registry with the default command-tool names.
    pub fn new() -> Self {
        Self::with_command_tools(
            crate::config::PermissionPolicy::default()
                .command_tools
                .into_iter(),
        )
    }

    /// Create a registry with a custom set of command-executing tool names.
    pub fn with_command_tools(command_tools: impl Iterator<Item = String>) -> Self {
        Self {
            entries: HashMap::new(),
            command_tools: command_tools.collect(),
            default_target: ToolSource::Mcp,
        }
    }

    /// Register a tool name for a backend.
    ///
    /// Re-registering a name replaces the previous entry (last write wins).
    pub fn register(&mut self, entry: RegistryEntry) {
        debug!(tool = %entry.name, source = %entry.source, "Registering tool");
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Look up a registered entry by name.
    pub fn get(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.get(name)
    }

    /// All registered entries, in no particular order.
    pub fn list(&self) -> Vec<&RegistryEntry> {
        self.entries.values().collect()
    }

    /// Check if a tool name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve the routing decision for a proposed tool name.
    ///
    /// Unknown names route to the default target (MCP) instead of erroring,
    /// so routing never blocks on bookkeeping gaps; a genuinely missing
    /// tool fails at invocation.
    ///
    /// # Example
    /// ```
    /// use femtoloop::tools::{PermissionType, RegistryEntry, ToolRegistry, ToolSource};
    ///
    /// let mut registry = ToolRegistry::new();
    /// registry.register(RegistryEntry::new("execute_command", ToolSource::Builtin));
    ///
    /// let route = registry.resolve_tool_route("execute_command");
    /// assert_eq!(route.target, ToolSource::Builtin);
    /// assert_eq!(route.permission, Some(PermissionType::Command));
    /// ```
    pub fn resolve_tool_route(&self, name: &str) -> ToolRoute {
        let target = self
            .entries
            .get(name)
            .map(|entry| entry.source)
            .unwrap_or(self.default_target);
        let permission = self
            .command_tools
            .contains(name)
            .then_some(PermissionType::Command);
        ToolRoute { target, permission }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
