//! Best-effort repair of malformed tool-call argument JSON.
//!
//! Models stream tool arguments incrementally and occasionally emit JSON
//! with recoverable syntax issues (a trailing comma, a missing closing
//! brace, a markdown code fence around the object). A call with such
//! arguments must not be dropped; it is repaired here and only surfaces as
//! an error when repair also fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::{FemtoError, Result};

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| {
    // `, }` or `, ]` with arbitrary whitespace between
    Regex::new(r",\s*([}\]])").unwrap_or_else(|e| panic!("invalid trailing-comma regex: {e}"))
});

/// Parse a raw tool-call argument string, applying best-effort repairs.
///
/// An empty or whitespace-only string parses as the empty object, matching
/// models that omit arguments for parameterless tools.
///
/// # Errors
/// Returns a tool error when the input cannot be parsed even after repair.
///
/// # Examples
/// ```
/// use femtoloop::utils::jsonrepair::parse_tool_arguments;
///
/// let v = parse_tool_arguments(r#"{"path": "/tmp",}"#).unwrap();
/// assert_eq!(v["path"], "/tmp");
///
/// let v = parse_tool_arguments("").unwrap();
/// assert!(v.as_object().unwrap().is_empty());
/// ```
pub fn parse_tool_arguments(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let repaired = repair_json(trimmed);
    serde_json::from_str(&repaired).map_err(|e| {
        FemtoError::Tool(format!(
            "unreparable tool arguments ({}): {}",
            e,
            truncate_for_log(raw)
        ))
    })
}

/// Apply textual repairs without parsing. Exposed for diagnostics.
pub fn repair_json(raw: &str) -> String {
    let mut text = strip_code_fence(raw.trim()).to_string();
    text = TRAILING_COMMA.replace_all(&text, "$1").into_owned();
    close_open_delimiters(&mut text);
    text
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Skip an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    rest.trim().trim_end_matches("```").trim()
}

/// Append closing delimiters for any unbalanced `{`/`[`, tracked outside
/// string literals. A dangling open string is closed first.
fn close_open_delimiters(text: &mut String) {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    if in_string {
        text.push('"');
    }
    while let Some(closer) = stack.pop() {
        text.push(closer);
    }
}

fn truncate_for_log(raw: &str) -> String {
    const MAX: usize = 120;
    if raw.len() <= MAX {
        return raw.to_string();
    }
    let mut cut = MAX;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &raw[..cut])
}
