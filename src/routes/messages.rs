use axum::{
    Json,
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::AppState;
use crate::config::{McpBridgeMode, ServerToolsMode};
use crate::error::ProxyError;
use crate::provider::{Provider, RoutingHints, resolve_provider};
use crate::server_tools::{ServerToolKind, categorize_server_tools};
use crate::transforms::{
    ChatCompletionResponse, MessagesRequest, TranslateOptions, WebSearchOptions,
    stream_openrouter_to_anthropic, transform_chat_response, transform_messages_request,
};

use super::upstream::{
    build_anthropic_request, build_openrouter_request, extract_api_key, relay_response,
};

pub async fn messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match handle_messages(&state, &headers, body).await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(
                status = err.status().as_u16(),
                kind = err.kind().as_str(),
                "Request failed: {err}"
            );
            err.into_response()
        }
    }
}

async fn handle_messages(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let request = parse_request(&body)?;
    let api_key = extract_api_key(headers)?;

    let hints = RoutingHints::from_headers(headers);
    if let Some(model) = &hints.original_model {
        tracing::debug!("Client reported original model {model}");
    }
    let mut resolution = resolve_provider(&hints, &request.model, &state.config)?;

    let server_tools = categorize_server_tools(request.tools.as_deref());
    let (web_search_tools, other_server_tools): (Vec<_>, Vec<_>) = server_tools
        .into_iter()
        .partition(|entry| entry.kind == ServerToolKind::WebSearch);

    if resolution.provider == Provider::OpenRouter && !other_server_tools.is_empty() {
        match state.config.server_tools_mode {
            ServerToolsMode::Error => {
                let labels: Vec<&str> = other_server_tools.iter().map(|e| e.label.as_str()).collect();
                return Err(ProxyError::invalid_request(
                    "Server tools require Anthropic provider",
                    Some(json!({ "tools": labels })),
                ));
            }
            ServerToolsMode::EnforceNative => {
                tracing::debug!("Server tools present, routing to Anthropic");
                resolution.provider = Provider::Anthropic;
                resolution.wire_model = resolution.original_model.clone();
            }
            ServerToolsMode::Emulate => {
                tracing::debug!("Server tool emulation is not implemented, forwarding unchanged");
            }
        }
    }

    let mut web_search = request.web_search_options().cloned();
    if resolution.provider == Provider::OpenRouter
        && !web_search_tools.is_empty()
        && web_search.is_none()
    {
        web_search = Some(WebSearchOptions::default());
    }

    let declares_mcp = request.mcp_servers.as_ref().is_some_and(|s| !s.is_empty());
    if declares_mcp
        && resolution.provider == Provider::OpenRouter
        && state.config.mcp_bridge_mode != McpBridgeMode::HttpSse
    {
        return Err(ProxyError::invalid_request(
            "MCP servers require Anthropic routing or http-sse bridge",
            Some(json!({ "mode": state.config.mcp_bridge_mode.as_str() })),
        ));
    }

    tracing::info!(
        provider = resolution.provider.as_str(),
        model = %resolution.original_model,
        wire_model = %resolution.wire_model,
        stream = request.is_stream(),
        "Handling messages request"
    );

    match resolution.provider {
        Provider::Anthropic => proxy_anthropic(state, headers, &api_key, body).await,
        Provider::OpenRouter => {
            let options = TranslateOptions {
                wire_model: resolution.wire_model,
                reasoning: request.reasoning().cloned(),
                web_search,
            };
            handle_openrouter(state, &api_key, &request, options, resolution.original_model).await
        }
    }
}

fn parse_request(body: &[u8]) -> Result<MessagesRequest, ProxyError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ProxyError::invalid_request("Request body is empty", None));
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid JSON body: {e}"), None))?;
    if !value.is_object() {
        return Err(ProxyError::invalid_request(
            "Request body must be a JSON object",
            None,
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| ProxyError::invalid_request(format!("Invalid request body: {e}"), None))
}

/// Forward the caller's body verbatim to the native upstream.
async fn proxy_anthropic(
    state: &AppState,
    headers: &HeaderMap,
    api_key: &str,
    body: Bytes,
) -> Result<Response, ProxyError> {
    let response = build_anthropic_request(
        &state.http_client,
        &state.config.anthropic_url,
        api_key,
        headers,
    )
    .body(body)
    .send()
    .await?;

    relay_response(response).await
}

async fn handle_openrouter(
    state: &AppState,
    api_key: &str,
    request: &MessagesRequest,
    options: TranslateOptions,
    original_model: String,
) -> Result<Response, ProxyError> {
    let chat_request = transform_messages_request(request, options);

    let response =
        build_openrouter_request(&state.http_client, &state.config.openrouter_url, api_key)
            .json(&chat_request)
            .send()
            .await?;
    let status = response.status();

    if request.is_stream() {
        if !status.is_success() {
            let payload = response.text().await?;
            tracing::warn!("OpenRouter streaming request returned {status}");
            return Err(ProxyError::invalid_request(
                "OpenRouter streaming error",
                Some(json!({ "status": status.as_u16(), "body": payload })),
            ));
        }

        let stream = stream_openrouter_to_anthropic(response.bytes_stream(), original_model);
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::CONNECTION, "keep-alive")
            .body(Body::from_stream(stream))
            .map_err(|e| ProxyError::Internal(e.to_string()));
    }

    let text = response.text().await?;
    if !status.is_success() {
        tracing::warn!("OpenRouter request returned {status}");
        // Keep the upstream's error as JSON when it is JSON
        let payload = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        return Err(ProxyError::invalid_request(
            "OpenRouter error",
            Some(json!({ "status": status.as_u16(), "body": payload })),
        ));
    }

    let completion: ChatCompletionResponse = serde_json::from_str(&text)?;
    let message = transform_chat_response(completion, &original_model)?;
    Ok((
        StatusCode::OK,
        [(header::CACHE_CONTROL, "no-store")],
        Json(message),
    )
        .into_response())
}
