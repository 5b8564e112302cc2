//! Tool call execution.
//!
//! Takes the completed tool calls assembled in a pass's [`LoopState`],
//! routes each to its backend, gates shell-executing tools through the
//! command permission service, and appends the resulting message pair to
//! the conversation. Oversized responses are offloaded to a per-
//! conversation file and replaced in-context by a stub; the unabridged
//! payload stays on the record's `raw_response` field for listeners that
//! need it.
//!
//! An abort observed during execution is classified as a cancellation,
//! not a tool failure: the record is marked `Cancelled` and the pass
//! stops without an error.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::agent::messages::build_post_tool_execution_context;
use crate::agent::r#loop::{LoopConsumer, ResponseEvent};
use crate::agent::{LoopState, ToolCallRecord, ToolCallStatus};
use crate::bus::{EngineUpdate, UpdateBus};
use crate::config::Config;
use crate::error::{FemtoError, Result};
use crate::permission::CommandPermissionService;
use crate::tools::{InvokeContext, PermissionType, ToolBackend, ToolRegistry, ToolSource};
use crate::utils::jsonrepair::parse_tool_arguments;

/// Maximum characters of terminal output republished on the update bus.
const TERMINAL_SNIPPET_MAX_CHARS: usize = 2_000;

/// What one processing round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Calls executed (completed or failed)
    pub executed: usize,
    /// Calls parked awaiting a human permission decision
    pub pending_approval: usize,
    /// The round was aborted by the cancellation signal
    pub cancelled: bool,
    /// The per-turn tool-call budget was exhausted
    pub limit_reached: bool,
}

/// Executes tool calls against their resolved backends.
pub struct ToolCallProcessor {
    config: Config,
    registry: Arc<ToolRegistry>,
    permissions: Arc<CommandPermissionService>,
    backends: HashMap<ToolSource, Arc<dyn ToolBackend>>,
    updates: Option<Arc<UpdateBus>>,
}

impl ToolCallProcessor {
    /// Create a processor with no backends attached.
    pub fn new(
        config: Config,
        registry: Arc<ToolRegistry>,
        permissions: Arc<CommandPermissionService>,
    ) -> Self {
        Self {
            config,
            registry,
            permissions,
            backends: HashMap::new(),
            updates: None,
        }
    }

    /// Attach a backend, keyed by its source.
    pub fn with_backend(mut self, backend: Arc<dyn ToolBackend>) -> Self {
        self.backends.insert(backend.source(), backend);
        self
    }

    /// Attach the fire-and-forget update bus.
    pub fn with_updates(mut self, updates: Arc<UpdateBus>) -> Self {
        self.updates = Some(updates);
        self
    }

    /// Execute the pass's ready tool calls, emitting response events to
    /// the consumer and appending message pairs to the state.
    pub async fn process(
        &self,
        state: &mut LoopState,
        consumer: &dyn LoopConsumer,
        cancel: &mut watch::Receiver<bool>,
        function_calling: bool,
    ) -> Result<ProcessOutcome> {
        let mut outcome = ProcessOutcome::default();
        let calls = state.take_ready_calls();

        for mut record in calls {
            if state.tool_call_count >= self.config.engine.max_tool_calls {
                info!(
                    conversation_id = %state.conversation_id,
                    max = self.config.engine.max_tool_calls,
                    "Tool-call budget exhausted, ending turn"
                );
                outcome.limit_reached = true;
                state.needs_continuation = false;
                break;
            }

            let route = self.registry.resolve_tool_route(&record.name);

            let args = match parse_tool_arguments(&record.arguments) {
                Ok(args) => args,
                Err(e) => {
                    // Repair already failed; report to the model as a tool
                    // error result so it can adapt.
                    warn!(tool = %record.name, error = %e, "Unreparable tool arguments");
                    record.status = ToolCallStatus::Failed;
                    record.response = Some(format!("Error: {}", e));
                    state.tool_call_count += 1;
                    outcome.executed += 1;
                    self.finish_call(state, consumer, record, function_calling)
                        .await;
                    continue;
                }
            };

            if route.permission == Some(PermissionType::Command) {
                let command = args
                    .get("command")
                    .and_then(|v| v.as_str())
                    .unwrap_or_else(|| record.arguments.trim());
                let decision = self
                    .permissions
                    .check_permission(&state.conversation_id, command);
                if !decision.allowed {
                    debug!(
                        tool = %record.name,
                        signature = %decision.risk.signature,
                        level = %decision.risk.level,
                        "Command awaiting approval"
                    );
                    record.status = ToolCallStatus::PendingApproval;
                    outcome.pending_approval += 1;
                    // The turn pauses until the caller records an approval
                    // and retries; no message pair is appended yet.
                    state.needs_continuation = false;
                    consumer
                        .handle_response(ResponseEvent::PermissionRequest { record, decision })
                        .await;
                    continue;
                }
            }

            record.status = ToolCallStatus::Running;
            consumer
                .handle_response(ResponseEvent::ToolCall(record.clone()))
                .await;

            let Some(backend) = self.backends.get(&route.target) else {
                record.status = ToolCallStatus::Failed;
                record.response = Some(format!("Error: no backend for source '{}'", route.target));
                state.tool_call_count += 1;
                outcome.executed += 1;
                self.finish_call(state, consumer, record, function_calling)
                    .await;
                continue;
            };

            let ctx = InvokeContext::new(&state.conversation_id);
            let start = std::time::Instant::now();
            let invocation = if *cancel.borrow() {
                Err(FemtoError::Cancelled)
            } else {
                let invoke = backend.invoke(&record.name, args, &ctx);
                tokio::pin!(invoke);
                let mut watch_cancel = true;
                loop {
                    tokio::select! {
                        biased;
                        changed = cancel.changed(), if watch_cancel => {
                            match changed {
                                Ok(()) if *cancel.borrow() => break Err(FemtoError::Cancelled),
                                Ok(()) => {}
                                // Sender dropped without signalling an
                                // abort; let the invocation finish.
                                Err(_) => watch_cancel = false,
                            }
                        }
                        result = &mut invoke => break result,
                    }
                }
            };
            let latency_ms = start.elapsed().as_millis() as u64;

            match invocation {
                Ok(response) => {
                    debug!(tool = %record.name, latency_ms, "Tool executed successfully");
                    record.raw_response = Some(response.clone());
                    record.response =
                        Some(self.offload_if_needed(&state.conversation_id, &record, &response)?);
                    record.status = ToolCallStatus::Completed;
                    if route.permission == Some(PermissionType::Command) {
                        self.publish_terminal_snippet(state, &record, &response);
                    }
                }
                Err(FemtoError::Cancelled) => {
                    info!(tool = %record.name, "Tool invocation aborted");
                    record.status = ToolCallStatus::Cancelled;
                    outcome.cancelled = true;
                    state.needs_continuation = false;
                    consumer
                        .handle_response(ResponseEvent::ToolCall(record))
                        .await;
                    break;
                }
                Err(e) => {
                    error!(tool = %record.name, latency_ms, error = %e, "Tool execution failed");
                    record.status = ToolCallStatus::Failed;
                    record.response = Some(format!("Error: {}", e));
                }
            }

            state.tool_call_count += 1;
            outcome.executed += 1;
            self.finish_call(state, consumer, record, function_calling)
                .await;
        }

        Ok(outcome)
    }

    /// Append the message pair for a finished call and notify listeners.
    async fn finish_call(
        &self,
        state: &mut LoopState,
        consumer: &dyn LoopConsumer,
        record: ToolCallRecord,
        function_calling: bool,
    ) {
        state
            .messages
            .extend(build_post_tool_execution_context(&record, function_calling));

        if let Some(updates) = &self.updates {
            updates.publish(EngineUpdate::ToolCallResult {
                conversation_id: state.conversation_id.clone(),
                record: record.clone(),
            });
        }
        consumer
            .handle_response(ResponseEvent::ToolCall(record))
            .await;
    }

    /// Persist an oversized response to the conversation's offload file
    /// and return the in-context stub; small responses pass through.
    fn offload_if_needed(
        &self,
        conversation_id: &str,
        record: &ToolCallRecord,
        response: &str,
    ) -> Result<String> {
        let char_count = response.chars().count();
        if char_count <= self.config.engine.offload_threshold_chars {
            return Ok(response.to_string());
        }

        let path = self.config.offload_path(conversation_id, &record.id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, response)?;
        info!(
            tool = %record.name,
            path = %path.display(),
            chars = char_count,
            "Tool response offloaded"
        );

        Ok(format!(
            "[Tool response offloaded to {} ({} characters). Read the file to access the full content.]",
            path.display(),
            char_count
        ))
    }

    fn publish_terminal_snippet(&self, state: &LoopState, record: &ToolCallRecord, output: &str) {
        let Some(updates) = &self.updates else {
            return;
        };
        let snippet: String = output.chars().take(TERMINAL_SNIPPET_MAX_CHARS).collect();
        updates.publish(EngineUpdate::TerminalSnippet {
            conversation_id: state.conversation_id.clone(),
            tool_call_id: record.id.clone(),
            output: snippet,
        });
    }
}
