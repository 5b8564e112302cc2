//! Agent module - the tool-calling loop engine
//!
//! This module drives multi-turn generation passes between a streaming
//! backend, the tool backends, and a consumer (the UI layer):
//!
//! - Consuming stream events and reassembling fragmented tool calls
//! - Gating shell commands behind the permission service
//! - Executing tool calls and appending result message pairs
//! - Offloading oversized tool responses out of the context window
//! - Compressing old context when the token budget is exceeded
//! - Cancelling superseded passes, one active loop per conversation
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   events   ┌──────────────────┐  ready calls  ┌────────────────────┐
//! │ EventStream  │───────────>│ LoopOrchestrator │──────────────>│ ToolCallProcessor  │
//! │ (provider or │            │   + LoopState    │               │  router/permission │
//! │  ACP mapper) │            └────────┬─────────┘               │  offload/messages  │
//! └──────────────┘                     │                         └─────────┬──────────┘
//!                                      ▼                                   ▼
//!                              ┌──────────────┐                   ┌────────────────┐
//!                              │ LoopConsumer │                   │  ToolBackends  │
//!                              │  (UI layer)  │                   │ mcp/agent/...  │
//!                              └──────────────┘                   └────────────────┘
//! ```

pub mod compaction;
mod messages;
mod processor;
mod state;

pub(crate) mod r#loop;

pub use compaction::{compress_context, CompactionReport};
pub use messages::{build_post_tool_execution_context, ensure_tool_call_id};
pub use processor::{ProcessOutcome, ToolCallProcessor};
pub use r#loop::{
    ActiveLoops, LoopConsumer, LoopEnd, LoopHandle, LoopOrchestrator, PassOptions, PassOutcome,
    ResponseEvent,
};
pub use state::{LoopState, ToolCallRecord, ToolCallStatus};
