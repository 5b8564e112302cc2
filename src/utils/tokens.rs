//! Character-based token estimation.
//!
//! The compressor needs a cheap, deterministic measure of context size.
//! The usual ~4 characters per token heuristic is accurate enough for
//! budget decisions and avoids shipping a tokenizer.

use crate::session::{Message, Role};

/// Characters per estimated token.
const CHARS_PER_TOKEN: usize = 4;

/// Fixed per-message overhead (role tags, separators) in tokens.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the token count of a text fragment.
///
/// # Examples
/// ```
/// use femtoloop::utils::tokens::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcd"), 1);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Estimate the token count of a single message, including any structured
/// tool-call arguments it carries.
pub fn estimate_message_tokens(message: &Message) -> usize {
    let mut total = MESSAGE_OVERHEAD_TOKENS + estimate_tokens(&message.content);
    if let Some(calls) = &message.tool_calls {
        for call in calls {
            total += estimate_tokens(&call.name) + estimate_tokens(&call.arguments);
        }
    }
    if message.role == Role::Tool {
        if let Some(id) = &message.tool_call_id {
            total += estimate_tokens(id);
        }
    }
    total
}

/// Estimate the total token count of a conversation.
pub fn estimate_context_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}
