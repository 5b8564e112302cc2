//! Loop orchestrator.
//!
//! Drives one generation pass: consumes a backend's [`EventStream`] to
//! exhaustion, routing every event in order to a [`LoopConsumer`], folding
//! it into the pass's [`LoopState`], and handing completed tool calls to
//! the [`ToolCallProcessor`]. The orchestrator holds no mutable cross-call
//! state; everything per-pass lives in the `LoopState` it creates and
//! discards.
//!
//! One active loop per conversation is the system invariant: starting a
//! pass for a conversation with an in-flight pass cancels the prior one
//! first (see [`ActiveLoops`]). Cancellation surfaces as a loop end with
//! the user-stop flag set, never as an error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::processor::ToolCallProcessor;
use crate::agent::{LoopState, ToolCallRecord};
use crate::error::Result;
use crate::events::{EventStream, StopReason, StreamEvent};
use crate::permission::PermissionDecision;

/// Payload routed to [`LoopConsumer::handle_response`].
#[derive(Debug, Clone)]
pub enum ResponseEvent {
    /// A raw stream event from the backend.
    Stream(StreamEvent),
    /// A tool call changed state (running, completed, failed, cancelled).
    /// The record's `raw_response` carries the unabridged result.
    ToolCall(ToolCallRecord),
    /// A shell command needs a human decision before it can run.
    PermissionRequest {
        record: ToolCallRecord,
        decision: PermissionDecision,
    },
}

/// Terminal state of one generation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopEnd {
    /// The pass was stopped by the user (or superseded by a newer pass)
    pub user_stopped: bool,
    /// Stop reason observed from the stream, or synthesized on a resource
    /// limit
    pub stop_reason: Option<StopReason>,
}

/// Receiver of a pass's events. Side effects live entirely here.
#[async_trait]
pub trait LoopConsumer: Send + Sync {
    /// Called once per non-error event, in stream order.
    async fn handle_response(&self, event: ResponseEvent);
    /// Called for every `error` stream event.
    async fn handle_error(&self, message: String);
    /// Called exactly once when the pass ends.
    async fn handle_end(&self, end: LoopEnd);
}

/// Handle for one registered pass.
pub struct LoopHandle {
    conversation_id: String,
    loop_id: String,
    cancel_rx: watch::Receiver<bool>,
}

impl LoopHandle {
    /// The cancellation receiver for this pass.
    pub fn cancel_receiver(&self) -> watch::Receiver<bool> {
        self.cancel_rx.clone()
    }
}

/// Tracks the single active loop per conversation.
///
/// `begin` cancels any in-flight pass for the conversation before
/// registering the new one.
pub struct ActiveLoops {
    loops: Mutex<HashMap<String, (String, watch::Sender<bool>)>>,
}

impl ActiveLoops {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            loops: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new pass for a conversation, cancelling the prior one.
    pub fn begin(&self, conversation_id: &str) -> LoopHandle {
        let (tx, rx) = watch::channel(false);
        let loop_id = Uuid::new_v4().to_string();

        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((prior_id, prior_tx)) =
            loops.insert(conversation_id.to_string(), (loop_id.clone(), tx))
        {
            info!(
                conversation_id = %conversation_id,
                superseded_loop = %prior_id,
                "Cancelling in-flight loop"
            );
            let _ = prior_tx.send(true);
        }

        LoopHandle {
            conversation_id: conversation_id.to_string(),
            loop_id,
            cancel_rx: rx,
        }
    }

    /// Cancel the active pass for a conversation, if any.
    pub fn cancel(&self, conversation_id: &str) -> bool {
        let loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        match loops.get(conversation_id) {
            Some((_, tx)) => tx.send(true).is_ok(),
            None => false,
        }
    }

    /// Deregister a finished pass. A pass that was superseded by a newer
    /// `begin` leaves the newer registration untouched.
    pub fn finish(&self, handle: &LoopHandle) {
        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((current_id, _)) = loops.get(&handle.conversation_id) {
            if *current_id == handle.loop_id {
                loops.remove(&handle.conversation_id);
            }
        }
    }

    /// Number of conversations with an active pass.
    pub fn active_count(&self) -> usize {
        let loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        loops.len()
    }
}

impl Default for ActiveLoops {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for one generation pass.
#[derive(Debug, Clone, Copy)]
pub struct PassOptions {
    /// Whether the active model configuration supports function calling.
    pub function_calling: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        Self {
            function_calling: true,
        }
    }
}

/// Result of a completed pass: the discardable state plus the end marker.
pub struct PassOutcome {
    /// The pass's final state (messages, usage, continuation flag)
    pub state: LoopState,
    /// How the pass ended
    pub end: LoopEnd,
}

/// Drives generation passes over event streams.
pub struct LoopOrchestrator {
    processor: Arc<ToolCallProcessor>,
    active: Arc<ActiveLoops>,
}

impl LoopOrchestrator {
    /// Create an orchestrator over a tool call processor.
    pub fn new(processor: Arc<ToolCallProcessor>) -> Self {
        Self {
            processor,
            active: Arc::new(ActiveLoops::new()),
        }
    }

    /// The active-loop registry, for external cancellation.
    pub fn active(&self) -> &Arc<ActiveLoops> {
        &self.active
    }

    /// Run one generation pass for a conversation.
    ///
    /// Consumes the stream to exhaustion, routing each event's payload to
    /// the matching consumer method in the order received — no event is
    /// dropped or reordered. When the stream ends with completed tool
    /// calls pending, the processor executes them and appends the
    /// post-execution messages to the pass state. The consumer's
    /// `handle_end` fires exactly once, with the user-stop flag when the
    /// pass was cancelled.
    pub async fn run_pass(
        &self,
        conversation_id: &str,
        options: PassOptions,
        mut stream: EventStream,
        consumer: &dyn LoopConsumer,
    ) -> Result<PassOutcome> {
        let handle = self.active.begin(conversation_id);
        let mut cancel = handle.cancel_receiver();
        let mut state = LoopState::new(conversation_id);
        debug!(
            conversation_id = %conversation_id,
            loop_id = %state.loop_id,
            "Starting generation pass"
        );

        let mut user_stopped = false;
        let mut watch_cancel = true;
        loop {
            tokio::select! {
                biased;
                changed = cancel.changed(), if watch_cancel => {
                    match changed {
                        Ok(()) if *cancel.borrow() => {
                            user_stopped = true;
                            stream.close();
                            break;
                        }
                        Ok(()) => {}
                        Err(_) => watch_cancel = false,
                    }
                }
                event = stream.next() => {
                    match event {
                        None => break,
                        Some(StreamEvent::Error { message }) => {
                            consumer.handle_error(message).await;
                        }
                        Some(event) => {
                            state.apply_event(&event);
                            consumer.handle_response(ResponseEvent::Stream(event)).await;
                        }
                    }
                }
            }
        }

        let mut limit_reached = false;
        if !user_stopped && state.has_ready_calls() {
            let outcome = match self
                .processor
                .process(&mut state, consumer, &mut cancel, options.function_calling)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.active.finish(&handle);
                    return Err(e);
                }
            };
            user_stopped = outcome.cancelled;
            limit_reached = outcome.limit_reached;
        }

        let stop_reason = if limit_reached {
            Some(StopReason::Complete)
        } else {
            state.stop_reason
        };
        let end = LoopEnd {
            user_stopped,
            stop_reason,
        };
        consumer.handle_end(end.clone()).await;
        self.active.finish(&handle);

        debug!(
            conversation_id = %conversation_id,
            loop_id = %state.loop_id,
            user_stopped,
            needs_continuation = state.needs_continuation,
            "Generation pass finished"
        );
        Ok(PassOutcome { state, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, PermissionPolicy};
    use crate::events::Usage;
    use crate::permission::CommandPermissionService;
    use crate::session::Role;
    use crate::tools::{EchoBackend, RegistryEntry, ToolRegistry, ToolSource};
    use std::sync::Mutex as StdMutex;

    struct RecordingConsumer {
        responses: StdMutex<Vec<ResponseEvent>>,
        errors: StdMutex<Vec<String>>,
        ends: StdMutex<Vec<LoopEnd>>,
    }

    impl RecordingConsumer {
        fn new() -> Self {
            Self {
                responses: StdMutex::new(Vec::new()),
                errors: StdMutex::new(Vec::new()),
                ends: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LoopConsumer for RecordingConsumer {
        async fn handle_response(&self, event: ResponseEvent) {
            self.responses.lock().unwrap().push(event);
        }
        async fn handle_error(&self, message: String) {
            self.errors.lock().unwrap().push(message);
        }
        async fn handle_end(&self, end: LoopEnd) {
            self.ends.lock().unwrap().push(end);
        }
    }

    fn orchestrator(dir: &tempfile::TempDir) -> LoopOrchestrator {
        let mut config = Config::default();
        config.data_dir = Some(dir.path().to_path_buf());
        let mut registry = ToolRegistry::new();
        registry.register(RegistryEntry::new("echo", ToolSource::Builtin));
        let processor = ToolCallProcessor::new(
            config,
            Arc::new(registry),
            Arc::new(CommandPermissionService::new(PermissionPolicy::default())),
        )
        .with_backend(Arc::new(EchoBackend));
        LoopOrchestrator::new(Arc::new(processor))
    }

    fn tool_use_script() -> Vec<StreamEvent> {
        vec![
            StreamEvent::Text {
                text: "Let me check.".into(),
            },
            StreamEvent::ToolCallStart {
                id: "c1".into(),
                name: "echo".into(),
            },
            StreamEvent::ToolCallChunk {
                id: "c1".into(),
                fragment: "{\"message\":".into(),
            },
            StreamEvent::ToolCallChunk {
                id: "c1".into(),
                fragment: " \"pong\"}".into(),
            },
            StreamEvent::ToolCallEnd {
                id: "c1".into(),
                complete_arguments: "{\"message\": \"pong\"}".into(),
            },
            StreamEvent::Usage(Usage::new(120, 30)),
            StreamEvent::Stop {
                reason: StopReason::ToolUse,
            },
        ]
    }

    #[tokio::test]
    async fn test_pass_routes_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let consumer = RecordingConsumer::new();

        let outcome = orchestrator
            .run_pass(
                "conv-1",
                PassOptions::default(),
                EventStream::from_events(tool_use_script()),
                &consumer,
            )
            .await
            .unwrap();

        let responses = consumer.responses.lock().unwrap();
        let streamed: Vec<StreamEvent> = responses
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::Stream(ev) => Some(ev.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(streamed, tool_use_script());

        assert_eq!(consumer.ends.lock().unwrap().len(), 1);
        assert!(!outcome.end.user_stopped);
        assert_eq!(outcome.end.stop_reason, Some(StopReason::ToolUse));
    }

    #[tokio::test]
    async fn test_pass_executes_assembled_tool_call() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let consumer = RecordingConsumer::new();

        let outcome = orchestrator
            .run_pass(
                "conv-1",
                PassOptions::default(),
                EventStream::from_events(tool_use_script()),
                &consumer,
            )
            .await
            .unwrap();

        let state = outcome.state;
        assert_eq!(state.text, "Let me check.");
        assert_eq!(state.tool_call_count, 1);
        assert!(state.needs_continuation);
        assert_eq!(state.usage.total_tokens, 150);

        // Message pairing: [assistant(tool_calls), tool] with matching ids.
        assert_eq!(state.messages.len(), 2);
        assert_eq!(state.messages[0].role, Role::Assistant);
        assert_eq!(state.messages[1].role, Role::Tool);
        let call = &state.messages[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(
            state.messages[1].tool_call_id.as_deref(),
            Some(call.id.as_str())
        );
        assert_eq!(state.messages[1].content, "pong");
    }

    #[tokio::test]
    async fn test_error_events_route_to_handle_error() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let consumer = RecordingConsumer::new();

        orchestrator
            .run_pass(
                "conv-1",
                PassOptions::default(),
                EventStream::from_events(vec![
                    StreamEvent::Error {
                        message: "backend hiccup".into(),
                    },
                    StreamEvent::Stop {
                        reason: StopReason::Error,
                    },
                ]),
                &consumer,
            )
            .await
            .unwrap();

        assert_eq!(
            consumer.errors.lock().unwrap().as_slice(),
            ["backend hiccup"]
        );
        assert_eq!(consumer.ends.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_plain_completion_has_no_continuation() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let consumer = RecordingConsumer::new();

        let outcome = orchestrator
            .run_pass(
                "conv-1",
                PassOptions::default(),
                EventStream::from_events(vec![
                    StreamEvent::Text {
                        text: "All done.".into(),
                    },
                    StreamEvent::Stop {
                        reason: StopReason::Complete,
                    },
                ]),
                &consumer,
            )
            .await
            .unwrap();

        assert!(!outcome.state.needs_continuation);
        assert!(outcome.state.messages.is_empty());
        assert_eq!(outcome.end.stop_reason, Some(StopReason::Complete));
    }

    #[tokio::test]
    async fn test_cancellation_ends_with_user_stop() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(&dir);
        let consumer = RecordingConsumer::new();

        // A stream that never ends on its own.
        let (producer, stream) = EventStream::channel(4);
        producer
            .send(StreamEvent::Text {
                text: "partial".into(),
            })
            .await
            .unwrap();

        let active = Arc::clone(orchestrator.active());
        let cancel_task = tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
            active.cancel("conv-1")
        });

        let outcome = orchestrator
            .run_pass("conv-1", PassOptions::default(), stream, &consumer)
            .await
            .unwrap();

        assert!(cancel_task.await.unwrap());
        assert!(outcome.end.user_stopped);
        // Cancellation is not an error.
        assert!(consumer.errors.lock().unwrap().is_empty());
        assert!(consumer.ends.lock().unwrap()[0].user_stopped);
    }

    #[tokio::test]
    async fn test_new_pass_supersedes_in_flight_pass() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Arc::new(orchestrator(&dir));
        let first_consumer = Arc::new(RecordingConsumer::new());

        let (_producer, first_stream) = EventStream::channel(4);
        let first = {
            let orchestrator = Arc::clone(&orchestrator);
            let consumer = Arc::clone(&first_consumer);
            tokio::spawn(async move {
                orchestrator
                    .run_pass("conv-1", PassOptions::default(), first_stream, &*consumer)
                    .await
            })
        };
        tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
        assert_eq!(orchestrator.active().active_count(), 1);

        // Second pass for the same conversation cancels the first.
        let second_consumer = RecordingConsumer::new();
        let outcome = orchestrator
            .run_pass(
                "conv-1",
                PassOptions::default(),
                EventStream::from_events(vec![StreamEvent::Stop {
                    reason: StopReason::Complete,
                }]),
                &second_consumer,
            )
            .await
            .unwrap();
        assert!(!outcome.end.user_stopped);

        let first_outcome = first.await.unwrap().unwrap();
        assert!(first_outcome.end.user_stopped);
        assert_eq!(orchestrator.active().active_count(), 0);
    }

    #[tokio::test]
    async fn test_independent_conversations_run_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = Arc::new(orchestrator(&dir));

        let mut tasks = Vec::new();
        for conv in ["conv-a", "conv-b", "conv-c"] {
            let orchestrator = Arc::clone(&orchestrator);
            tasks.push(tokio::spawn(async move {
                let consumer = RecordingConsumer::new();
                orchestrator
                    .run_pass(
                        conv,
                        PassOptions::default(),
                        EventStream::from_events(tool_use_script()),
                        &consumer,
                    )
                    .await
            }));
        }
        for task in tasks {
            let outcome = task.await.unwrap().unwrap();
            assert_eq!(outcome.state.tool_call_count, 1);
        }
        assert_eq!(orchestrator.active().active_count(), 0);
    }

    #[test]
    fn test_active_loops_cancel_unknown_conversation() {
        let active = ActiveLoops::new();
        assert!(!active.cancel("ghost"));
    }

    #[test]
    fn test_finish_ignores_superseded_handle() {
        let active = ActiveLoops::new();
        let old = active.begin("conv-1");
        let _new = active.begin("conv-1");

        active.finish(&old);
        assert_eq!(active.active_count(), 1);
    }
}
