//! Request/response transformations between the Anthropic Messages API and
//! OpenRouter chat completions.
//!
//! This module provides:
//! - `common`: Shared utilities (id generation, finish reason mapping)
//! - `openrouter_compat`: Typed schemas and non-streaming conversion
//! - `streaming`: SSE stream transformation

pub mod common;
pub mod openrouter_compat;
pub mod streaming;

// Re-export commonly used items
pub use openrouter_compat::{
    ChatCompletionResponse, MessagesRequest, ToolDefinition, TranslateOptions, WebSearchOptions,
    transform_chat_response, transform_messages_request,
};
pub use streaming::stream_openrouter_to_anthropic;
