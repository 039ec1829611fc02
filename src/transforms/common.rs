//! Shared utilities for request/response transformations.

use uuid::Uuid;

/// Generate an identifier in `<prefix>_<32-hex>` form, e.g. `msg_4f1c...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

/// Map a chat-completions finish reason to an Anthropic stop reason.
///
/// Unknown reasons pass through unchanged; a missing or empty reason maps to `None`.
pub fn map_stop_reason(reason: Option<&str>) -> Option<String> {
    let reason = reason.filter(|r| !r.is_empty())?;
    let mapped = match reason {
        "stop" => "end_turn",
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        "content_filter" => "content_filter",
        other => other,
    };
    Some(mapped.to_string())
}
