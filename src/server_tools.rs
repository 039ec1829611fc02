//! Detection of Anthropic server tools (tools executed by the native upstream).

use crate::transforms::ToolDefinition;

/// Tool names that are server tools regardless of their declared type
/// (compared lower-cased with `_`/`-` removed).
const SERVER_TOOL_ALIASES: &[&str] = &[
    "websearch",
    "webfetch",
    "codeexecution",
    "computeruse",
    "texteditor",
    "memorytool",
];

/// Tool names treated as web search (same normalization)
const WEB_SEARCH_ALIASES: &[&str] = &["websearch", "websearchtool", "webfetch", "webfetchtool"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerToolKind {
    WebSearch,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerToolEntry {
    pub label: String,
    pub kind: ServerToolKind,
}

/// Classify the server tools in `tools`, preserving declaration order.
pub fn categorize_server_tools(tools: Option<&[ToolDefinition]>) -> Vec<ServerToolEntry> {
    tools
        .unwrap_or_default()
        .iter()
        .filter(|tool| is_server_tool(tool))
        .map(|tool| {
            let label = non_empty(&tool.kind)
                .or_else(|| non_empty(&tool.name))
                .unwrap_or("server_tool")
                .to_string();
            let kind = if is_web_search_tool(tool) {
                ServerToolKind::WebSearch
            } else {
                ServerToolKind::Other
            };
            ServerToolEntry { label, kind }
        })
        .collect()
}

pub fn is_server_tool(tool: &ToolDefinition) -> bool {
    if let Some(kind) = non_empty(&tool.kind)
        && is_server_tool_type(kind)
    {
        return true;
    }
    non_empty(&tool.name).is_some_and(|name| SERVER_TOOL_ALIASES.contains(&squash(name).as_str()))
}

fn is_web_search_tool(tool: &ToolDefinition) -> bool {
    if non_empty(&tool.kind).is_some_and(|kind| squash(kind).contains("websearch")) {
        return true;
    }
    non_empty(&tool.name).is_some_and(|name| {
        let name = squash(name);
        name.contains("websearch") || WEB_SEARCH_ALIASES.contains(&name.as_str())
    })
}

/// `WebSearchTool_20250305`, `MemoryTool`, or date-versioned `web_search_20250305`
fn is_server_tool_type(kind: &str) -> bool {
    let lower = kind.to_lowercase();
    if lower.contains("tool_") || lower.ends_with("tool") {
        return true;
    }
    match lower.rsplit_once('_') {
        Some((base, version)) => {
            !base.is_empty() && version.len() == 8 && version.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
