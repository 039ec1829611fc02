use axum::{
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use bytes::Bytes;
use reqwest::{Client, RequestBuilder};

use crate::constants::{ANTHROPIC_VERSION_HEADER, API_KEY_HEADER};
use crate::error::ProxyError;

/// Body substituted when the native upstream fails without saying why
const EMPTY_UPSTREAM_ERROR: &str = r#"{"error":"Anthropic upstream error"}"#;

/// Response headers that describe the upstream hop, not the payload
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "transfer-encoding",
    "content-length",
    "keep-alive",
];

/// Extract API key from Authorization: Bearer header (OpenAI style)
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_at_checked(7)?;
    if !scheme.eq_ignore_ascii_case("bearer ") {
        return None;
    }
    Some(token.trim()).filter(|t| !t.is_empty())
}

/// Extract the caller credential: a bearer token wins over `x-api-key`.
pub fn extract_api_key(headers: &HeaderMap) -> Result<String, ProxyError> {
    if let Some(token) = extract_bearer_token(headers) {
        return Ok(token.to_string());
    }
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProxyError::authentication("Missing API key"))
}

/// Build a request to the native Anthropic API with the minimal header set
pub fn build_anthropic_request(
    client: &Client,
    url: &str,
    api_key: &str,
    inbound: &HeaderMap,
) -> RequestBuilder {
    let mut builder = client
        .post(url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(API_KEY_HEADER, api_key);
    if let Some(version) = inbound.get(ANTHROPIC_VERSION_HEADER) {
        builder = builder.header(ANTHROPIC_VERSION_HEADER, version);
    }
    builder
}

/// Build a request to the OpenRouter chat completions API
pub fn build_openrouter_request(client: &Client, url: &str, api_key: &str) -> RequestBuilder {
    client
        .post(url)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {api_key}"))
}

/// Relay a native upstream response to the caller unchanged.
///
/// Successful bodies (including SSE streams) are streamed through as they
/// arrive; failures are buffered so an empty body can be replaced.
pub async fn relay_response(response: reqwest::Response) -> Result<Response, ProxyError> {
    let status = StatusCode::from_u16(response.status().as_u16())
        .map_err(|e| ProxyError::Internal(format!("Invalid upstream status: {e}")))?;

    if !status.is_success() {
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| header::HeaderValue::from_static("application/json"));
        let text = response.text().await?;
        tracing::warn!("Anthropic upstream returned {status}");
        let body = if text.is_empty() {
            Bytes::from_static(EMPTY_UPSTREAM_ERROR.as_bytes())
        } else {
            Bytes::from(text)
        };
        return Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .map_err(|e| ProxyError::Internal(e.to_string()));
    }

    let mut builder = Response::builder().status(status);
    for (name, value) in response.headers() {
        if !HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
            builder = builder.header(name, value);
        }
    }
    builder
        .body(Body::from_stream(response.bytes_stream()))
        .map_err(|e| ProxyError::Internal(e.to_string()))
}
