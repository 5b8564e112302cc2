//! Post-tool-execution message construction.
//!
//! After a tool call finishes, the conversation needs the minimal message
//! sequence the active calling convention requires. With function calling
//! enabled that is an `assistant` message carrying the `tool_calls` entry
//! plus a paired `tool` message with the matching `tool_call_id`. When the
//! model configuration does not support function calling, the result is
//! injected as a `<function_call>`-tagged textual record on a plain
//! assistant message instead.

use serde_json::json;
use uuid::Uuid;

use crate::agent::ToolCallRecord;
use crate::session::{Message, ToolCall};

/// Build the message pair (or legacy record) for a finished tool call.
///
/// A missing or empty upstream tool-call id is replaced with a freshly
/// generated, stable id before pairing; the same id appears in both the
/// assistant and tool messages.
///
/// # Examples
/// ```
/// use femtoloop::agent::{build_post_tool_execution_context, ToolCallRecord, ToolCallStatus};
/// use femtoloop::session::Role;
///
/// let mut record = ToolCallRecord::new("", "search", r#"{"q": "rust"}"#);
/// record.status = ToolCallStatus::Completed;
/// record.response = Some("3 results".into());
///
/// let messages = build_post_tool_execution_context(&record, true);
/// assert_eq!(messages.len(), 2);
/// assert_eq!(messages[0].role, Role::Assistant);
/// assert_eq!(messages[1].role, Role::Tool);
///
/// let id = &messages[0].tool_calls.as_ref().unwrap()[0].id;
/// assert!(!id.is_empty());
/// assert_eq!(messages[1].tool_call_id.as_deref(), Some(id.as_str()));
/// ```
pub fn build_post_tool_execution_context(
    record: &ToolCallRecord,
    function_calling: bool,
) -> Vec<Message> {
    let response = record.response.as_deref().unwrap_or("");

    if function_calling {
        let id = ensure_tool_call_id(&record.id);
        let assistant = Message::assistant_with_tools(
            "",
            vec![ToolCall::new(&id, &record.name, &record.arguments)],
        );
        let tool = Message::tool_result(&id, response);
        vec![assistant, tool]
    } else {
        let tagged = json!({
            "name": record.name,
            "arguments": record.arguments,
            "response": response,
        });
        vec![Message::assistant(&format!(
            "<function_call>{}</function_call>",
            tagged
        ))]
    }
}

/// Return the upstream id, or a generated non-empty replacement.
pub fn ensure_tool_call_id(id: &str) -> String {
    if id.trim().is_empty() {
        format!("call_{}", Uuid::new_v4().simple())
    } else {
        id.to_string()
    }
}
