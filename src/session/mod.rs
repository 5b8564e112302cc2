//! Session module - conversation settings and workspace resolution
//!
//! Provides the per-conversation settings store (in-memory for tests,
//! JSON-file backed for real use) and the [`WorkspaceManager`], which
//! resolves the execution mode and working directory a tool invocation
//! runs under.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use femtoloop::session::{
//!     ConversationSettings, ExecutionMode, MemorySettingsStore, SettingsStore, WorkspaceManager,
//! };
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(MemorySettingsStore::new());
//! store
//!     .save(&ConversationSettings::new("conv-1", ExecutionMode::Chat))
//!     .await
//!     .unwrap();
//!
//! let manager = WorkspaceManager::new(store, "/tmp/femtoloop-data".into());
//! let ctx = manager.resolve_workspace_context("conv-1", "model-a").await.unwrap();
//! assert!(ctx.workspace_path.is_none());
//! # });
//! ```

pub mod types;

pub use types::{ConversationSettings, ExecutionMode, Message, Role, ToolCall};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{FemtoError, Result};

/// Persistence boundary for conversation settings.
///
/// The relational store behind this trait is an external collaborator; the
/// engine only needs load and save. Implementations must be safe to share
/// across tasks.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load settings for a conversation.
    ///
    /// # Errors
    /// Returns `NotFound` if the conversation has no settings yet.
    async fn load(&self, conversation_id: &str) -> Result<ConversationSettings>;

    /// Persist settings for a conversation.
    async fn save(&self, settings: &ConversationSettings) -> Result<()>;
}

/// In-memory settings store.
///
/// Counts `save` calls so tests can assert on persistence side effects.
pub struct MemorySettingsStore {
    settings: RwLock<HashMap<String, ConversationSettings>>,
    save_count: AtomicUsize,
}

impl MemorySettingsStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self {
            settings: RwLock::new(HashMap::new()),
            save_count: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls observed since construction.
    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self, conversation_id: &str) -> Result<ConversationSettings> {
        let settings = self.settings.read().await;
        settings
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| FemtoError::NotFound(format!("conversation: {}", conversation_id)))
    }

    async fn save(&self, settings: &ConversationSettings) -> Result<()> {
        self.save_count.fetch_add(1, Ordering::SeqCst);
        let mut map = self.settings.write().await;
        map.insert(settings.conversation_id.clone(), settings.clone());
        Ok(())
    }
}

/// JSON-file backed settings store: one file per conversation under the
/// given directory.
pub struct FileSettingsStore {
    dir: PathBuf,
}

impl FileSettingsStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn file_path(&self, conversation_id: &str) -> PathBuf {
        let safe: String = conversation_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load(&self, conversation_id: &str) -> Result<ConversationSettings> {
        let path = self.file_path(conversation_id);
        if !path.exists() {
            return Err(FemtoError::NotFound(format!(
                "conversation: {}",
                conversation_id
            )));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    async fn save(&self, settings: &ConversationSettings) -> Result<()> {
        let path = self.file_path(&settings.conversation_id);
        let content = serde_json::to_string_pretty(settings)?;
        tokio::fs::write(&path, content).await?;
        debug!(conversation_id = %settings.conversation_id, "Saved conversation settings");
        Ok(())
    }
}

/// Resolved execution context for one conversation + model pair.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceContext {
    /// The conversation's execution mode.
    pub mode: ExecutionMode,
    /// Working directory for workspace-dependent tools, if any.
    pub workspace_path: Option<PathBuf>,
}

/// Resolves the execution mode and working directory for tool invocations.
pub struct WorkspaceManager {
    store: Arc<dyn SettingsStore>,
    data_root: PathBuf,
}

impl WorkspaceManager {
    /// Create a manager over a settings store and the application data root.
    pub fn new(store: Arc<dyn SettingsStore>, data_root: PathBuf) -> Self {
        Self { store, data_root }
    }

    /// Resolve the workspace context for a conversation and model.
    ///
    /// - `chat`: no workspace, no persistence side effect.
    /// - `agent`: derives `<data_root>/workspaces/<conversation_id>` on
    ///   first use and persists it back exactly once; later calls return
    ///   the recorded path without saving.
    /// - `acp_agent`: returns the per-model working directory verbatim and
    ///   never persists — the external agent owns that directory. A missing
    ///   entry resolves to `None`; callers must treat workspace-dependent
    ///   tools as unavailable rather than erroring.
    pub async fn resolve_workspace_context(
        &self,
        conversation_id: &str,
        model_id: &str,
    ) -> Result<WorkspaceContext> {
        let mut settings = self.store.load(conversation_id).await?;

        match settings.mode {
            ExecutionMode::Chat => Ok(WorkspaceContext {
                mode: ExecutionMode::Chat,
                workspace_path: None,
            }),
            ExecutionMode::Agent => {
                let path = match settings.workspace_path.clone() {
                    Some(path) => path,
                    None => {
                        let derived = self.derive_agent_workspace(conversation_id);
                        settings.set_workspace_path(derived.clone());
                        self.store.save(&settings).await?;
                        info!(
                            conversation_id = %conversation_id,
                            path = %derived.display(),
                            "Derived agent workspace"
                        );
                        derived
                    }
                };
                Ok(WorkspaceContext {
                    mode: ExecutionMode::Agent,
                    workspace_path: Some(path),
                })
            }
            ExecutionMode::AcpAgent => Ok(WorkspaceContext {
                mode: ExecutionMode::AcpAgent,
                workspace_path: settings.acp_work_dirs.get(model_id).cloned(),
            }),
        }
    }

    /// Deterministic agent-mode workspace path for a conversation.
    ///
    /// Recomputing after persistence yields the same path.
    pub fn derive_agent_workspace(&self, conversation_id: &str) -> PathBuf {
        self.data_root.join("workspaces").join(conversation_id)
    }
}
