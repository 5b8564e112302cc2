//! Configuration management for femtoloop
//!
//! Configuration is loaded from `~/.femtoloop/config.json` with environment
//! variable overrides (`FEMTOLOOP_*`). The engine's policy data lives here:
//! the offload threshold, the loop's tool-call and token budgets, the
//! command whitelist, and the names of shell-executing tools. The policy
//! *precedence* (whitelist > approval cache > risk assessment) is fixed in
//! the permission service; only the tables are data.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Loop-engine limits and thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum tool calls executed within one conversation turn.
    pub max_tool_calls: usize,
    /// Context token budget; the compressor runs above this.
    pub context_token_budget: usize,
    /// Serialized tool responses longer than this many characters are
    /// offloaded to disk and replaced in-context by a stub.
    pub offload_threshold_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 25,
            context_token_budget: 32_000,
            offload_threshold_chars: 3_000,
        }
    }
}

/// Command-permission policy tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionPolicy {
    /// Command signatures that are always allowed without approval.
    pub whitelist: Vec<String>,
    /// Tool names whose invocations execute shell commands and therefore
    /// route through the permission service.
    pub command_tools: Vec<String>,
}

/// Read-only or otherwise non-destructive command signatures.
const DEFAULT_WHITELIST: &[&str] = &[
    "ls", "cat", "head", "tail", "grep", "rg", "find", "pwd", "echo", "which", "whoami", "date",
    "wc", "env", "ps", "df", "du", "uname", "stat", "file", "git status", "git log", "git diff",
    "git branch", "git show", "git remote",
];

/// Tool names that execute shell commands.
const DEFAULT_COMMAND_TOOLS: &[&str] = &[
    "execute_command",
    "run_command",
    "shell",
    "bash",
    "run_terminal_cmd",
];

impl Default for PermissionPolicy {
    fn default() -> Self {
        Self {
            whitelist: DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
            command_tools: DEFAULT_COMMAND_TOOLS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Top-level configuration for the loop engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Override for the application data root. Defaults to `~/.femtoloop`.
    pub data_dir: Option<PathBuf>,
    /// Loop limits and thresholds.
    pub engine: EngineConfig,
    /// Command-permission policy tables.
    pub permissions: PermissionPolicy,
}

impl Config {
    /// Returns the default configuration directory path (`~/.femtoloop`).
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".femtoloop")
    }

    /// Returns the path to the config file (`~/.femtoloop/config.json`).
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    ///
    /// A missing config file yields the default configuration.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `FEMTOLOOP_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("FEMTOLOOP_DATA_DIR") {
            if !val.is_empty() {
                self.data_dir = Some(PathBuf::from(val));
            }
        }
        if let Ok(val) = std::env::var("FEMTOLOOP_ENGINE_MAX_TOOL_CALLS") {
            if let Ok(v) = val.parse() {
                self.engine.max_tool_calls = v;
            }
        }
        if let Ok(val) = std::env::var("FEMTOLOOP_ENGINE_CONTEXT_TOKEN_BUDGET") {
            if let Ok(v) = val.parse() {
                self.engine.context_token_budget = v;
            }
        }
        if let Ok(val) = std::env::var("FEMTOLOOP_ENGINE_OFFLOAD_THRESHOLD_CHARS") {
            if let Ok(v) = val.parse() {
                self.engine.offload_threshold_chars = v;
            }
        }
    }

    /// The effective application data root.
    pub fn data_root(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(Self::dir)
    }

    /// Per-conversation session directory under the data root.
    pub fn sessions_dir(&self, conversation_id: &str) -> PathBuf {
        self.data_root().join("sessions").join(conversation_id)
    }

    /// Root directory for derived agent-mode workspaces.
    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_root().join("workspaces")
    }

    /// Offload file path for one tool response.
    pub fn offload_path(&self, conversation_id: &str, tool_call_id: &str) -> PathBuf {
        self.sessions_dir(conversation_id)
            .join(format!("tool_{}.offload", tool_call_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.max_tool_calls, 25);
        assert_eq!(config.engine.offload_threshold_chars, 3_000);
        assert!(config.permissions.whitelist.contains(&"ls".to_string()));
        assert!(config
            .permissions
            .command_tools
            .contains(&"execute_command".to_string()));
    }

    #[test]
    fn test_load_missing_file_yields_default() {
        let config = Config::load_from_path(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config.engine.context_token_budget, 32_000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.engine.max_tool_calls = 7;
        config.data_dir = Some(dir.path().to_path_buf());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.engine.max_tool_calls, 7);
        assert_eq!(loaded.data_dir.as_deref(), Some(dir.path()));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"max_tool_calls": 3}}"#).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.engine.max_tool_calls, 3);
        assert_eq!(loaded.engine.offload_threshold_chars, 3_000);
        assert!(!loaded.permissions.whitelist.is_empty());
    }

    #[test]
    fn test_offload_path_layout() {
        let mut config = Config::default();
        config.data_dir = Some(PathBuf::from("/data"));

        let path = config.offload_path("conv-1", "call_9");
        assert_eq!(
            path,
            PathBuf::from("/data/sessions/conv-1/tool_call_9.offload")
        );
    }

    #[test]
    fn test_workspaces_dir_under_data_root() {
        let mut config = Config::default();
        config.data_dir = Some(PathBuf::from("/data"));
        assert_eq!(config.workspaces_dir(), PathBuf::from("/data/workspaces"));
    }
}
