//! Integration tests for femtoloop
//!
//! These tests verify that the components work together: a scripted event
//! stream driven through the orchestrator, tool execution with offload,
//! the permission flow, the ACP mapper feeding the same pipeline, and
//! context compression over a finished pass.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use femtoloop::acp::{AcpContentMapper, SessionNotification, ToolCallStatus as AcpStatus};
use femtoloop::agent::{
    compress_context, LoopConsumer, LoopEnd, LoopOrchestrator, PassOptions, ResponseEvent,
    ToolCallProcessor, ToolCallStatus,
};
use femtoloop::config::{Config, PermissionPolicy};
use femtoloop::events::{EventStream, StopReason, StreamEvent, Usage};
use femtoloop::permission::{CommandPermissionService, PermissionReason};
use femtoloop::session::{
    ConversationSettings, ExecutionMode, FileSettingsStore, Message, Role, SettingsStore,
    WorkspaceManager,
};
use femtoloop::tools::{
    EchoBackend, InvokeContext, RegistryEntry, ToolBackend, ToolDefinition, ToolRegistry,
    ToolSource,
};

// ============================================================================
// Shared fixtures
// ============================================================================

#[derive(Default)]
struct CollectingConsumer {
    responses: Mutex<Vec<ResponseEvent>>,
    errors: Mutex<Vec<String>>,
    ends: Mutex<Vec<LoopEnd>>,
}

impl CollectingConsumer {
    fn tool_records(&self) -> Vec<femtoloop::agent::ToolCallRecord> {
        self.responses
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::ToolCall(record) => Some(record.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl LoopConsumer for CollectingConsumer {
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

/// Backend whose every invocation returns a fixed payload.
struct PayloadBackend {
    payload: String,
}

#[async_trait]
impl ToolBackend for PayloadBackend {
    fn source(&self) -> ToolSource {
        ToolSource::Mcp
    }
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::new(
            "dump",
            "Returns a large payload",
            serde_json::json!({"type": "object"}),
        )]
    }
    async fn invoke(
        &self,
        _name: &str,
        _args: serde_json::Value,
        _ctx: &InvokeContext,
    ) -> femtoloop::Result<String> {
        Ok(self.payload.clone())
    }
}

fn engine(dir: &tempfile::TempDir, registry: ToolRegistry) -> (LoopOrchestrator, Arc<CommandPermissionService>) {
    let mut config = Config::default();
    config.data_dir = Some(dir.path().to_path_buf());
    let permissions = Arc::new(CommandPermissionService::new(PermissionPolicy::default()));
    let processor = ToolCallProcessor::new(config, Arc::new(registry), Arc::clone(&permissions))
        .with_backend(Arc::new(EchoBackend));
    (LoopOrchestrator::new(Arc::new(processor)), permissions)
}

// ============================================================================
// Full pass: fragmented stream to paired messages
// ============================================================================

#[tokio::test]
async fn test_fragmented_tool_call_to_message_pair() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("echo", ToolSource::Builtin));
    let (orchestrator, _) = engine(&dir, registry);
    let consumer = CollectingConsumer::default();

    let script = vec![
        StreamEvent::Reasoning {
            text: "need to echo".into(),
        },
        StreamEvent::Text {
            text: "Echoing now.".into(),
        },
        StreamEvent::ToolCallStart {
            id: "c1".into(),
            name: "echo".into(),
        },
        StreamEvent::ToolCallChunk {
            id: "c1".into(),
            fragment: r#"{"mess"#.into(),
        },
        StreamEvent::ToolCallChunk {
            id: "c1".into(),
            fragment: r#"age": "ping"}"#.into(),
        },
        StreamEvent::ToolCallEnd {
            id: "c1".into(),
            complete_arguments: r#"{"message": "ping"}"#.into(),
        },
        StreamEvent::Usage(Usage::new(200, 40)),
        StreamEvent::Stop {
            reason: StopReason::ToolUse,
        },
    ];

    let outcome = orchestrator
        .run_pass(
            "conv-int-1",
            PassOptions::default(),
            EventStream::from_events(script.clone()),
            &consumer,
        )
        .await
        .unwrap();

    // Stream events arrived in order, none dropped.
    let streamed: Vec<StreamEvent> = consumer
        .responses
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            ResponseEvent::Stream(ev) => Some(ev.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(streamed, script);

    // The pass assembled, executed, and paired the call.
    let state = outcome.state;
    assert_eq!(state.reasoning, "need to echo");
    assert_eq!(state.text, "Echoing now.");
    assert!(state.needs_continuation);
    assert_eq!(state.messages.len(), 2);
    assert_eq!(state.messages[0].role, Role::Assistant);
    assert_eq!(state.messages[1].role, Role::Tool);
    let call = &state.messages[0].tool_calls.as_ref().unwrap()[0];
    assert_eq!(call.arguments, r#"{"message": "ping"}"#);
    assert_eq!(
        state.messages[1].tool_call_id.as_deref(),
        Some(call.id.as_str())
    );
    assert_eq!(state.messages[1].content, "ping");

    assert!(consumer.errors.lock().unwrap().is_empty());
    assert_eq!(consumer.ends.lock().unwrap().len(), 1);
    assert_eq!(outcome.end.stop_reason, Some(StopReason::ToolUse));
}

// ============================================================================
// Offload round-trip
// ============================================================================

#[tokio::test]
async fn test_offload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let payload = "x".repeat(3_001);

    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("dump", ToolSource::Mcp));
    let mut config = Config::default();
    config.data_dir = Some(dir.path().to_path_buf());
    let permissions = Arc::new(CommandPermissionService::new(PermissionPolicy::default()));
    let processor = ToolCallProcessor::new(
        config.clone(),
        Arc::new(registry),
        Arc::clone(&permissions),
    )
    .with_backend(Arc::new(PayloadBackend {
        payload: payload.clone(),
    }));
    let orchestrator = LoopOrchestrator::new(Arc::new(processor));
    let consumer = CollectingConsumer::default();

    let outcome = orchestrator
        .run_pass(
            "conv-off",
            PassOptions::default(),
            EventStream::from_events(vec![
                StreamEvent::ToolCallStart {
                    id: "big".into(),
                    name: "dump".into(),
                },
                StreamEvent::ToolCallEnd {
                    id: "big".into(),
                    complete_arguments: "{}".into(),
                },
                StreamEvent::Stop {
                    reason: StopReason::ToolUse,
                },
            ]),
            &consumer,
        )
        .await
        .unwrap();

    let record = consumer
        .tool_records()
        .into_iter()
        .find(|r| r.status == ToolCallStatus::Completed)
        .unwrap();

    // In-context stub names the offload and the exact character count.
    let stub = record.response.clone().unwrap();
    assert!(stub.contains("offloaded"));
    assert!(stub.contains("3001"));
    assert_eq!(outcome.state.messages[1].content, stub);

    // Out-of-band raw response is the full payload.
    assert_eq!(record.raw_response.as_deref(), Some(payload.as_str()));

    // Offload file matches byte-for-byte at the documented layout.
    let offload = config.offload_path("conv-off", "big");
    assert_eq!(std::fs::read(&offload).unwrap(), payload.as_bytes());
}

// ============================================================================
// Permission flow
// ============================================================================

#[tokio::test]
async fn test_permission_flow_deny_approve_retry() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("execute_command", ToolSource::Builtin));
    let (orchestrator, permissions) = engine(&dir, registry);

    let script = || {
        EventStream::from_events(vec![
            StreamEvent::ToolCallStart {
                id: "sh1".into(),
                name: "execute_command".into(),
            },
            StreamEvent::ToolCallEnd {
                id: "sh1".into(),
                complete_arguments: r#"{"command": "cargo install ripgrep", "message": "run"}"#
                    .into(),
            },
            StreamEvent::Stop {
                reason: StopReason::ToolUse,
            },
        ])
    };

    // First pass: parked on approval.
    let consumer = CollectingConsumer::default();
    let outcome = orchestrator
        .run_pass("conv-perm", PassOptions::default(), script(), &consumer)
        .await
        .unwrap();
    assert!(!outcome.state.needs_continuation);
    assert!(outcome.state.messages.is_empty());

    let request = consumer
        .responses
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            ResponseEvent::PermissionRequest { record, decision } => {
                Some((record.clone(), decision.clone()))
            }
            _ => None,
        })
        .unwrap();
    assert_eq!(request.0.status, ToolCallStatus::PendingApproval);
    assert_eq!(request.1.reason, PermissionReason::Permission);
    assert_eq!(request.1.risk.signature, "cargo install");

    // The user approves once; the retried pass executes.
    permissions.approve("conv-perm", "cargo install ripgrep", false);
    let consumer = CollectingConsumer::default();
    let outcome = orchestrator
        .run_pass("conv-perm", PassOptions::default(), script(), &consumer)
        .await
        .unwrap();
    assert_eq!(outcome.state.messages.len(), 2);
    assert_eq!(outcome.state.messages[1].content, "run");

    // The one-shot approval was consumed: a third pass parks again.
    let consumer = CollectingConsumer::default();
    let outcome = orchestrator
        .run_pass("conv-perm", PassOptions::default(), script(), &consumer)
        .await
        .unwrap();
    assert!(outcome.state.messages.is_empty());
}

// ============================================================================
// Legacy (function calling disabled)
// ============================================================================

#[tokio::test]
async fn test_legacy_mode_produces_tagged_text() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("echo", ToolSource::Builtin));
    let (orchestrator, _) = engine(&dir, registry);
    let consumer = CollectingConsumer::default();

    let outcome = orchestrator
        .run_pass(
            "conv-legacy",
            PassOptions {
                function_calling: false,
            },
            EventStream::from_events(vec![
                StreamEvent::ToolCallStart {
                    id: "c1".into(),
                    name: "echo".into(),
                },
                StreamEvent::ToolCallEnd {
                    id: "c1".into(),
                    complete_arguments: r#"{"message": "legacy"}"#.into(),
                },
                StreamEvent::Stop {
                    reason: StopReason::ToolUse,
                },
            ]),
            &consumer,
        )
        .await
        .unwrap();

    let messages = &outcome.state.messages;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Assistant);
    assert!(messages.iter().all(|m| m.role != Role::Tool));
    assert!(messages[0].content.contains("<function_call>"));
    assert!(messages[0].content.contains("legacy"));
}

// ============================================================================
// ACP mapper feeding the same pipeline
// ============================================================================

#[tokio::test]
async fn test_acp_notifications_drive_a_pass() {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("echo", ToolSource::Builtin));
    let (orchestrator, _) = engine(&dir, registry);
    let consumer = CollectingConsumer::default();

    let mapper = AcpContentMapper::new();
    let mut events = Vec::new();
    events.extend(mapper.map_notification(&SessionNotification::tool_call("acp-sess", "t1", "echo")));
    events.extend(mapper.map_notification(&SessionNotification::tool_call_update(
        "acp-sess",
        "t1",
        Some(r#"{"message":"#),
        None,
    )));
    events.extend(mapper.map_notification(&SessionNotification::tool_call_update(
        "acp-sess",
        "t1",
        Some(r#" "from acp"}"#),
        Some(AcpStatus::Completed),
    )));
    events.push(StreamEvent::Stop {
        reason: StopReason::ToolUse,
    });

    let outcome = orchestrator
        .run_pass(
            "conv-acp",
            PassOptions::default(),
            EventStream::from_events(events),
            &consumer,
        )
        .await
        .unwrap();

    assert_eq!(outcome.state.messages.len(), 2);
    assert_eq!(outcome.state.messages[1].content, "from acp");
    assert_eq!(mapper.in_flight_count(), 0);
}

// ============================================================================
// Compression over a finished pass
// ============================================================================

#[tokio::test]
async fn test_compression_after_long_pass() {
    let dir = tempfile::tempdir().unwrap();
    let payload = "y".repeat(2_000);
    let mut registry = ToolRegistry::new();
    registry.register(RegistryEntry::new("dump", ToolSource::Mcp));
    let mut config = Config::default();
    config.data_dir = Some(dir.path().to_path_buf());
    let processor = ToolCallProcessor::new(
        config,
        Arc::new(registry),
        Arc::new(CommandPermissionService::new(PermissionPolicy::default())),
    )
    .with_backend(Arc::new(PayloadBackend {
        payload: payload.clone(),
    }));
    let orchestrator = LoopOrchestrator::new(Arc::new(processor));
    let consumer = CollectingConsumer::default();

    let outcome = orchestrator
        .run_pass(
            "conv-compress",
            PassOptions::default(),
            EventStream::from_events(vec![
                StreamEvent::ToolCallStart {
                    id: "d1".into(),
                    name: "dump".into(),
                },
                StreamEvent::ToolCallEnd {
                    id: "d1".into(),
                    complete_arguments: "{}".into(),
                },
                StreamEvent::Stop {
                    reason: StopReason::ToolUse,
                },
            ]),
            &consumer,
        )
        .await
        .unwrap();

    // Build a conversation: old turn with bulky tool traffic, then a new
    // user message.
    let mut conversation: Vec<Message> = vec![Message::user("dump it")];
    conversation.extend(outcome.state.messages.clone());
    conversation.push(Message::assistant("Here is the dump."));
    conversation.push(Message::user("now summarize"));

    let report = compress_context(&mut conversation, 50, true);
    assert!(report.tokens_recovered > 0);

    // The bulky tool result before the current turn is gone; the current
    // user message is untouched.
    let tool_msg = conversation.iter().find(|m| m.role == Role::Tool).unwrap();
    assert!(tool_msg.content.len() < 100);
    assert_eq!(conversation.last().unwrap().content, "now summarize");
}

// ============================================================================
// Workspace resolution with file-backed settings
// ============================================================================

#[tokio::test]
async fn test_workspace_resolution_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSettingsStore::new(dir.path().join("conversations")).unwrap());
    store
        .save(&ConversationSettings::new("conv-ws", ExecutionMode::Agent))
        .await
        .unwrap();

    let manager = WorkspaceManager::new(
        Arc::clone(&store) as Arc<dyn SettingsStore>,
        dir.path().to_path_buf(),
    );

    let first = manager
        .resolve_workspace_context("conv-ws", "model-a")
        .await
        .unwrap();
    let second = manager
        .resolve_workspace_context("conv-ws", "model-a")
        .await
        .unwrap();

    assert_eq!(first.workspace_path, second.workspace_path);
    assert_eq!(
        first.workspace_path,
        Some(dir.path().join("workspaces").join("conv-ws"))
    );

    // The derived path survived persistence.
    let reloaded = store.load("conv-ws").await.unwrap();
    assert_eq!(reloaded.workspace_path, first.workspace_path);
}
