//! Context compression for long conversations.
//!
//! When the accumulated context exceeds the token budget, tool-call bodies
//! are stripped from messages strictly before the most recent user message
//! and replaced with short markers. Messages in the current turn are never
//! touched. With function calling disabled this is a no-op: legacy
//! `<function_call>` text is not structurally isolable from surrounding
//! prose.

use tracing::debug;

use crate::session::{Message, Role};
use crate::utils::tokens::estimate_context_tokens;

/// Marker substituted for stripped tool-call arguments.
const CALL_MARKER: &str = "[tool call content removed]";

/// Marker substituted for stripped tool results.
const RESULT_MARKER: &str = "[tool result removed]";

/// What a compression pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompactionReport {
    /// Estimated tokens recovered by the pass
    pub tokens_recovered: usize,
    /// Number of messages whose tool bodies were stripped
    pub messages_stripped: usize,
}

/// Compress the context in place when it exceeds `token_budget`.
///
/// Structural pairing is preserved: an assistant message keeps its
/// `tool_calls` entries (id and name) so the paired tool message stays
/// addressable, but argument bodies and result text are replaced by
/// markers.
///
/// # Examples
/// ```
/// use femtoloop::agent::compress_context;
/// use femtoloop::session::{Message, ToolCall};
///
/// let mut messages = vec![
///     Message::assistant_with_tools(
///         "",
///         vec![ToolCall::new("c1", "search", &"x".repeat(4000))],
///     ),
///     Message::tool_result("c1", &"y".repeat(4000)),
///     Message::user("and now?"),
/// ];
/// let report = compress_context(&mut messages, 100, true);
/// assert!(report.tokens_recovered > 0);
/// assert_eq!(messages[1].content, "[tool result removed]");
/// ```
pub fn compress_context(
    messages: &mut [Message],
    token_budget: usize,
    function_calling: bool,
) -> CompactionReport {
    if !function_calling {
        return CompactionReport::default();
    }

    let before = estimate_context_tokens(messages);
    if before <= token_budget {
        return CompactionReport::default();
    }

    // Everything from the most recent user message onward is the current
    // turn and stays intact.
    let boundary = messages
        .iter()
        .rposition(|m| m.role == Role::User)
        .unwrap_or(0);

    let mut stripped = 0;
    for message in &mut messages[..boundary] {
        let mut touched = false;

        if let Some(calls) = message.tool_calls.as_mut() {
            for call in calls.iter_mut() {
                if call.arguments != CALL_MARKER && !call.arguments.is_empty() {
                    call.arguments = CALL_MARKER.to_string();
                    touched = true;
                }
            }
        }

        if message.is_tool_result() && message.content != RESULT_MARKER {
            message.content = RESULT_MARKER.to_string();
            touched = true;
        }

        if touched {
            stripped += 1;
        }
    }

    let after = estimate_context_tokens(messages);
    let report = CompactionReport {
        tokens_recovered: before.saturating_sub(after),
        messages_stripped: stripped,
    };
    if report.messages_stripped > 0 {
        debug!(
            tokens_recovered = report.tokens_recovered,
            messages_stripped = report.messages_stripped,
            "Compressed context"
        );
    }
    report
}
