//! Anthropic Messages ↔ OpenRouter chat completions conversion.
//!
//! Callers speak the Anthropic Messages format; the routed upstream speaks
//! OpenRouter's chat completions format. This module owns both schemas and
//! the non-streaming translation in each direction.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::common::{generate_id, map_stop_reason};
use crate::error::ProxyError;
use crate::server_tools::is_server_tool;

// ============================================================================
// Anthropic Request Types
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    pub model: String,
    pub system: Option<SystemPrompt>,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub tool_choice: Option<ToolChoice>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub stop_sequences: Option<Vec<String>>,
    pub stream: Option<bool>,
    pub metadata: Option<RequestMetadata>,
    pub mcp_servers: Option<Vec<Value>>,
}

impl MessagesRequest {
    pub fn is_stream(&self) -> bool {
        self.stream.unwrap_or(false)
    }

    pub fn reasoning(&self) -> Option<&ReasoningConfig> {
        self.castari_metadata()?.reasoning.as_ref()
    }

    pub fn web_search_options(&self) -> Option<&WebSearchOptions> {
        self.castari_metadata()?.web_search_options.as_ref()
    }

    fn castari_metadata(&self) -> Option<&CastariMetadata> {
        self.metadata.as_ref()?.castari.as_ref()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Blocks(Vec<SystemBlock>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemBlock {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    ToolUse {
        id: Option<String>,
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<ToolResultContent>,
        #[allow(dead_code)]
        is_error: Option<bool>,
    },
    /// Block kinds with no chat completions equivalent (thinking, document, ...)
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<ToolResultBlock>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

/// Caller tool declaration. Client tools carry a name and input schema;
/// server tools are identified by their `type`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolDefinition {
    pub name: Option<String>,
    pub description: Option<String>,
    pub input_schema: Option<Value>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"auto"`, `"none"`
    Mode(String),
    /// `{"type": "tool", "name": "..."}`
    Named { name: String },
    /// `{"type": "auto" | "any" | "none"}`
    Typed {
        #[serde(rename = "type")]
        kind: String,
    },
    #[allow(dead_code)]
    Other(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestMetadata {
    pub castari: Option<CastariMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CastariMetadata {
    pub reasoning: Option<ReasoningConfig>,
    pub web_search_options: Option<WebSearchOptions>,
}

/// Reasoning hints forwarded to OpenRouter's `reasoning` field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exclude: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_context_size: Option<String>,
}

// ============================================================================
// OpenRouter Request Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ChatToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugins: Option<Vec<WebPlugin>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search_options: Option<WebSearchOptions>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: ChatContent,
    },
    Assistant {
        content: ChatContent,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ChatToolCall>>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatToolCall {
    pub id: String,
    pub r#type: String,
    pub function: ChatFunctionCall,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub struct ChatTool {
    pub r#type: String,
    pub function: ChatFunction,
}

#[derive(Debug, Serialize)]
pub struct ChatFunction {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChatToolChoice {
    Mode(String),
    Function {
        r#type: String,
        function: ChatFunctionName,
    },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ChatFunctionName {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct WebPlugin {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

// ============================================================================
// OpenRouter Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub finish_reason: Option<String>,
    pub message: Option<ChatResponseMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseMessage {
    pub content: Option<ChatResponseContent>,
    pub tool_calls: Option<Vec<ChatResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChatResponseContent {
    Text(String),
    Parts(Vec<ChatResponsePart>),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatResponsePart {
    Text {
        text: String,
    },
    ImageUrl {
        image_url: ImageUrl,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseToolCall {
    pub id: Option<String>,
    pub function: ChatResponseFunction,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponseFunction {
    #[serde(default)]
    pub name: String,
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub reasoning_tokens: Option<u64>,
    pub completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionTokensDetails {
    pub reasoning_tokens: Option<u64>,
}

// ============================================================================
// Anthropic Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub id: String,
    pub r#type: String,
    pub role: String,
    pub model: String,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub content: Vec<ResponseBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    Image {
        source: UrlImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Debug, PartialEq, Serialize)]
pub struct UrlImageSource {
    pub r#type: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Usage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_tokens: Option<u64>,
}

impl From<&ChatUsage> for Usage {
    fn from(usage: &ChatUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            reasoning_tokens: usage.reasoning_tokens.or_else(|| {
                usage
                    .completion_tokens_details
                    .as_ref()
                    .and_then(|d| d.reasoning_tokens)
            }),
        }
    }
}

// ============================================================================
// Transform Functions
// ============================================================================

/// Per-request inputs that do not come from the request body itself
#[derive(Debug, Default)]
pub struct TranslateOptions {
    pub wire_model: String,
    pub reasoning: Option<ReasoningConfig>,
    pub web_search: Option<WebSearchOptions>,
}

/// Transform an Anthropic Messages request into an OpenRouter chat completions request.
///
/// Server tools are dropped from the tool list; callers are expected to have
/// applied the server-tool policy before calling this.
pub fn transform_messages_request(
    req: &MessagesRequest,
    options: TranslateOptions,
) -> ChatCompletionRequest {
    let mut messages = Vec::new();
    if let Some(system) = &req.system {
        messages.push(ChatMessage::System {
            content: flatten_system(system),
        });
    }
    for message in &req.messages {
        messages.extend(convert_message(message));
    }

    let tools = req
        .tools
        .as_deref()
        .map(convert_tools)
        .filter(|tools| !tools.is_empty());

    let plugins = options.web_search.as_ref().map(|ws| {
        vec![WebPlugin {
            id: "web".to_string(),
            engine: ws.engine.clone(),
            max_results: ws.max_results,
        }]
    });

    ChatCompletionRequest {
        model: options.wire_model,
        messages,
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stop: req.stop_sequences.clone(),
        stream: req.is_stream(),
        tools,
        tool_choice: req.tool_choice.as_ref().map(convert_tool_choice),
        reasoning: options.reasoning,
        plugins,
        web_search_options: options.web_search,
    }
}

/// Transform the first choice of an OpenRouter completion into an Anthropic message.
pub fn transform_chat_response(
    resp: ChatCompletionResponse,
    original_model: &str,
) -> Result<MessagesResponse, ProxyError> {
    let usage = resp.usage.as_ref().map(Usage::from);
    let id = resp
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| generate_id("msg"));

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProxyError::invalid_request("OpenRouter response missing choices", None))?;

    let mut content = Vec::new();
    if let Some(message) = choice.message {
        if let Some(body) = message.content {
            content.extend(convert_response_content(body));
        }
        for call in message.tool_calls.unwrap_or_default() {
            content.push(ResponseBlock::ToolUse {
                id: call
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| generate_id("tool")),
                name: call.function.name,
                input: parse_tool_arguments(call.function.arguments.as_deref()),
            });
        }
    }

    Ok(MessagesResponse {
        id,
        r#type: "message".to_string(),
        role: "assistant".to_string(),
        model: original_model.to_string(),
        stop_reason: map_stop_reason(choice.finish_reason.as_deref()),
        stop_sequence: None,
        content,
        usage,
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

fn flatten_system(system: &SystemPrompt) -> String {
    match system {
        SystemPrompt::Text(text) => text.clone(),
        SystemPrompt::Blocks(blocks) => blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn convert_message(message: &Message) -> Vec<ChatMessage> {
    let blocks = match &message.content {
        MessageContent::Text(text) => {
            return vec![plain_message(message.role, ChatContent::Text(text.clone()))];
        }
        MessageContent::Blocks(blocks) => blocks,
    };

    let mut plain = Vec::new();
    let mut tool_uses = Vec::new();
    let mut tool_results = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::ToolUse { .. } => tool_uses.push(block),
            ContentBlock::ToolResult { .. } => tool_results.push(block),
            ContentBlock::Text { .. } | ContentBlock::Image { .. } => plain.push(block),
            // thinking, documents, ... have no chat completions form
            ContentBlock::Other => {}
        }
    }

    let mut resolved = Vec::new();

    // Tool messages must directly follow the assistant turn that issued the calls
    for block in tool_results {
        if let ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } = block
        {
            resolved.push(ChatMessage::Tool {
                tool_call_id: tool_use_id.clone(),
                content: tool_result_text(content.as_ref()),
            });
        }
    }

    if !plain.is_empty() {
        resolved.push(plain_message(message.role, convert_content_parts(&plain)));
    }

    if message.role == Role::Assistant && !tool_uses.is_empty() {
        let tool_calls = tool_uses
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ChatToolCall {
                    id: id
                        .clone()
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| generate_id("tool")),
                    r#type: "function".to_string(),
                    function: ChatFunctionCall {
                        name: name.clone().unwrap_or_else(|| "unknown_tool".to_string()),
                        arguments: stringify_arguments(input),
                    },
                }),
                _ => None,
            })
            .collect();
        resolved.push(ChatMessage::Assistant {
            content: ChatContent::Text(String::new()),
            tool_calls: Some(tool_calls),
        });
    }

    // Keep turn-taking aligned even when nothing was convertible
    if resolved.is_empty() {
        resolved.push(plain_message(message.role, ChatContent::Text(String::new())));
    }

    resolved
}

fn plain_message(role: Role, content: ChatContent) -> ChatMessage {
    match role {
        Role::User => ChatMessage::User { content },
        Role::Assistant => ChatMessage::Assistant {
            content,
            tool_calls: None,
        },
    }
}

fn convert_content_parts(blocks: &[&ContentBlock]) -> ChatContent {
    if let [ContentBlock::Text { text }] = blocks {
        return ChatContent::Text(text.clone());
    }

    let parts: Vec<ChatContentPart> = blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(ChatContentPart::Text { text: text.clone() }),
            ContentBlock::Image { source } => {
                let url = match source {
                    ImageSource::Base64 { media_type, data } => {
                        format!("data:{media_type};base64,{data}")
                    }
                    ImageSource::Url { url } => url.clone(),
                    ImageSource::Other => return None,
                };
                Some(ChatContentPart::ImageUrl {
                    image_url: ImageUrl { url },
                })
            }
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        ChatContent::Text(String::new())
    } else {
        ChatContent::Parts(parts)
    }
}

fn tool_result_text(content: Option<&ToolResultContent>) -> String {
    match content {
        Some(ToolResultContent::Text(text)) => text.clone(),
        Some(ToolResultContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|b| match b {
                ToolResultBlock::Text { text } => Some(text.as_str()),
                ToolResultBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        None => String::new(),
    }
}

fn stringify_arguments(input: &Value) -> String {
    if input.is_null() {
        return "{}".to_string();
    }
    serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string())
}

fn convert_tools(tools: &[ToolDefinition]) -> Vec<ChatTool> {
    tools
        .iter()
        .filter(|tool| !is_server_tool(tool))
        .filter_map(|tool| {
            let name = tool.name.as_ref().filter(|n| !n.is_empty())?;
            let parameters = tool.input_schema.as_ref()?;
            Some(ChatTool {
                r#type: "function".to_string(),
                function: ChatFunction {
                    name: name.clone(),
                    description: tool.description.clone(),
                    parameters: parameters.clone(),
                },
            })
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> ChatToolChoice {
    let mode = match choice {
        ToolChoice::Mode(mode) | ToolChoice::Typed { kind: mode } => mode.as_str(),
        ToolChoice::Named { name } => {
            return ChatToolChoice::Function {
                r#type: "function".to_string(),
                function: ChatFunctionName { name: name.clone() },
            };
        }
        ToolChoice::Other(_) => "auto",
    };
    match mode {
        "none" => ChatToolChoice::Mode("none".to_string()),
        _ => ChatToolChoice::Mode("auto".to_string()),
    }
}

fn convert_response_content(content: ChatResponseContent) -> Vec<ResponseBlock> {
    match content {
        ChatResponseContent::Text(text) if text.is_empty() => Vec::new(),
        ChatResponseContent::Text(text) => vec![ResponseBlock::Text { text }],
        ChatResponseContent::Parts(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                ChatResponsePart::Text { text } => Some(ResponseBlock::Text { text }),
                ChatResponsePart::ImageUrl { image_url } => Some(ResponseBlock::Image {
                    source: UrlImageSource {
                        r#type: "url".to_string(),
                        url: image_url.url,
                    },
                }),
                ChatResponsePart::Other => None,
            })
            .collect(),
    }
}

/// Parse tool call arguments, keeping the raw string when it is not valid JSON.
fn parse_tool_arguments(arguments: Option<&str>) -> Value {
    match arguments.filter(|a| !a.is_empty()) {
        None => Value::Object(Map::new()),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())),
    }
}
