use std::env;
use std::time::Duration;

use dotenvy::dotenv;

use crate::constants::{
    ANTHROPIC_MESSAGES_PATH, DEFAULT_ANTHROPIC_BASE_URL, DEFAULT_HOST, DEFAULT_OPENROUTER_BASE_URL,
    DEFAULT_OPENROUTER_VENDOR, DEFAULT_PORT, DEFAULT_UPSTREAM_TIMEOUT_SECS,
    OPENROUTER_COMPLETIONS_PATH,
};

/// What to do when a routed request declares tools only Anthropic can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerToolsMode {
    /// Reject the request with an invalid_request_error
    Error,
    /// Send the request to the native upstream instead
    EnforceNative,
    /// Accepted but inert: the request is forwarded unchanged
    Emulate,
}

/// MCP server declarations bridging mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McpBridgeMode {
    Off,
    HttpSse,
}

impl McpBridgeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            McpBridgeMode::Off => "off",
            McpBridgeMode::HttpSse => "http-sse",
        }
    }
}

/// CORS configuration mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsMode {
    /// Only allow localhost origins (default, for local development)
    LocalhostOnly,
    /// Allow all origins
    AllowAll,
    /// Allow specific origins (comma-separated list)
    AllowList(Vec<String>),
}

/// Raw, unvalidated settings. Every field may be absent.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub anthropic_base_url: Option<String>,
    pub openrouter_base_url: Option<String>,
    pub server_tools_mode: Option<String>,
    pub mcp_bridge_mode: Option<String>,
    pub openrouter_default_vendor: Option<String>,
    pub host: Option<String>,
    pub port: Option<String>,
    pub cors_origins: Option<String>,
    pub upstream_timeout_secs: Option<String>,
}

impl Settings {
    pub fn from_env() -> Self {
        dotenv().ok();

        Self {
            anthropic_base_url: env::var("UPSTREAM_ANTHROPIC_BASE_URL").ok(),
            openrouter_base_url: env::var("UPSTREAM_OPENROUTER_BASE_URL").ok(),
            server_tools_mode: env::var("SERVER_TOOLS_MODE").ok(),
            mcp_bridge_mode: env::var("MCP_BRIDGE_MODE").ok(),
            openrouter_default_vendor: env::var("OPENROUTER_DEFAULT_VENDOR").ok(),
            host: env::var("GATEWAY_HOST").ok(),
            port: env::var("GATEWAY_PORT").ok(),
            cors_origins: env::var("GATEWAY_CORS_ORIGINS").ok(),
            upstream_timeout_secs: env::var("GATEWAY_UPSTREAM_TIMEOUT_SECS").ok(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cors_mode: CorsMode,
    pub upstream_timeout: Duration,
    /// Full URL of the native Messages endpoint
    pub anthropic_url: String,
    /// Full URL of the routed chat completions endpoint
    pub openrouter_url: String,
    pub server_tools_mode: ServerToolsMode,
    pub mcp_bridge_mode: McpBridgeMode,
    /// Lower-cased vendor used to qualify bare `or:` slugs
    pub default_vendor: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_settings(&Settings::from_env())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let anthropic_url = normalize_base_url(
            present(&settings.anthropic_base_url).unwrap_or(DEFAULT_ANTHROPIC_BASE_URL),
            ANTHROPIC_MESSAGES_PATH,
        );
        let openrouter_url = normalize_base_url(
            present(&settings.openrouter_base_url).unwrap_or(DEFAULT_OPENROUTER_BASE_URL),
            OPENROUTER_COMPLETIONS_PATH,
        );

        let server_tools_mode = match present(&settings.server_tools_mode)
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("enforce-native" | "enforcenative" | "enforce-anthropic" | "enforceanthropic") => {
                ServerToolsMode::EnforceNative
            }
            Some("emulate") => ServerToolsMode::Emulate,
            _ => ServerToolsMode::Error,
        };

        let mcp_bridge_mode = match present(&settings.mcp_bridge_mode)
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("http-sse") => McpBridgeMode::HttpSse,
            _ => McpBridgeMode::Off,
        };

        let default_vendor = present(&settings.openrouter_default_vendor)
            .unwrap_or(DEFAULT_OPENROUTER_VENDOR)
            .to_lowercase();

        let host = present(&settings.host).unwrap_or(DEFAULT_HOST).to_string();
        let port = present(&settings.port)
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        // "*" (allow all), comma-separated origins, or localhost only
        let cors_mode = match present(&settings.cors_origins) {
            Some("*") => CorsMode::AllowAll,
            Some(origins) => CorsMode::AllowList(
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            ),
            None => CorsMode::LocalhostOnly,
        };

        let upstream_timeout = Duration::from_secs(
            present(&settings.upstream_timeout_secs)
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        );

        Self {
            host,
            port,
            cors_mode,
            upstream_timeout,
            anthropic_url,
            openrouter_url,
            server_tools_mode,
            mcp_bridge_mode,
            default_vendor,
        }
    }
}

/// Trimmed value, with blank strings treated as unset.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Strip trailing slashes and append `suffix` unless the URL already ends with it.
pub fn normalize_base_url(value: &str, suffix: &str) -> String {
    let trimmed = value.trim_end_matches('/');
    if trimmed.ends_with(suffix) {
        trimmed.to_string()
    } else {
        format!("{trimmed}{suffix}")
    }
}
