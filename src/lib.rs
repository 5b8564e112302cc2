//! femtoloop - agentic tool-calling loop engine
//!
//! The subsystem that drives a multi-turn conversation between a language
//! model, a set of callable tool backends (built-ins, MCP servers, browser
//! automation, or an external ACP coding agent), and a human operator who
//! approves risky actions. Desktop UI, persistence, and model wire formats
//! are external collaborators behind small interfaces.

pub mod acp;
pub mod agent;
pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod permission;
pub mod session;
pub mod tools;
pub mod utils;

pub use agent::{LoopConsumer, LoopEnd, LoopOrchestrator, PassOptions, ResponseEvent};
pub use config::Config;
pub use error::{FemtoError, Result};
pub use events::{EventProducer, EventStream, StopReason, StreamEvent, Usage};
pub use permission::{CommandPermissionService, PermissionDecision, RiskLevel};
pub use session::{ConversationSettings, ExecutionMode, Message, Role, WorkspaceManager};
pub use tools::{ToolBackend, ToolRegistry, ToolSource};
