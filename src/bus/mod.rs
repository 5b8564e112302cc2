//! Update bus - fire-and-forget publications to external collaborators
//!
//! The engine emits plan-entry updates, terminal-output snippets, and
//! model-status/tool-call-result notifications for the UI and persistence
//! layers to observe. These are publications the core never awaits: the
//! channel is bounded and a full buffer drops the update with a warning
//! rather than blocking the loop.
//!
//! # Example
//!
//! ```
//! use femtoloop::bus::{EngineUpdate, UpdateBus};
//!
//! # tokio_test::block_on(async {
//! let bus = UpdateBus::new();
//! bus.publish(EngineUpdate::ModelStatus {
//!     conversation_id: "conv-1".into(),
//!     status: "generating".into(),
//! });
//! let update = bus.consume().await.unwrap();
//! assert!(matches!(update, EngineUpdate::ModelStatus { .. }));
//! # });
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::agent::ToolCallRecord;

/// Default buffer size for the update channel.
const DEFAULT_BUFFER_SIZE: usize = 256;

/// One entry in an agent's published plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanEntry {
    /// Entry text
    pub content: String,
    /// Entry status (e.g. "pending", "in_progress", "completed")
    pub status: String,
}

/// Updates the engine publishes without awaiting delivery.
#[derive(Debug, Clone)]
pub enum EngineUpdate {
    /// The agent's current plan changed.
    PlanEntries {
        conversation_id: String,
        entries: Vec<PlanEntry>,
    },
    /// A snippet of terminal output from a command-executing tool.
    TerminalSnippet {
        conversation_id: String,
        tool_call_id: String,
        output: String,
    },
    /// Model status changed (generating, waiting, done).
    ModelStatus {
        conversation_id: String,
        status: String,
    },
    /// A tool call reached a new state; carries the full record including
    /// the out-of-band raw response.
    ToolCallResult {
        conversation_id: String,
        record: ToolCallRecord,
    },
}

/// Bounded, non-blocking publication channel for [`EngineUpdate`]s.
pub struct UpdateBus {
    tx: mpsc::Sender<EngineUpdate>,
    rx: Arc<Mutex<mpsc::Receiver<EngineUpdate>>>,
}

impl UpdateBus {
    /// Create a bus with the default buffer size.
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    /// Create a bus with a custom buffer size.
    pub fn with_buffer_size(buffer_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer_size);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    /// Publish an update without awaiting the consumer.
    ///
    /// A full buffer drops the update: observers are advisory and must
    /// never backpressure the loop.
    pub fn publish(&self, update: EngineUpdate) {
        if let Err(e) = self.tx.try_send(update) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!("Update bus full, dropping engine update");
                }
                mpsc::error::TrySendError::Closed(_) => {
                    warn!("Update bus closed, dropping engine update");
                }
            }
        }
    }

    /// Consume the next update. Returns `None` if all senders are gone.
    pub async fn consume(&self) -> Option<EngineUpdate> {
        let mut rx = self.rx.lock().await;
        rx.recv().await
    }

    /// Consume without waiting; `None` when the buffer is empty.
    pub async fn try_consume(&self) -> Option<EngineUpdate> {
        let mut rx = self.rx.lock().await;
        rx.try_recv().ok()
    }
}

impl Default for UpdateBus {
    fn default() -> Self {
        Self::new()
    }
}
