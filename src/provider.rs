//! Upstream selection and wire-model resolution.

use axum::http::HeaderMap;

use crate::config::Config;
use crate::constants::{MODEL_HEADER, PROVIDER_HEADER, WIRE_MODEL_HEADER};
use crate::error::ProxyError;

/// Upstream that will serve a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Anthropic Messages API, body forwarded verbatim
    Anthropic,
    /// OpenRouter chat completions, body translated
    OpenRouter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
            Provider::OpenRouter => "openrouter",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "anthropic" => Some(Provider::Anthropic),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }
}

/// Optional routing hints a cooperating client puts on the inbound request
#[derive(Debug, Clone, Default)]
pub struct RoutingHints {
    pub provider: Option<Provider>,
    pub original_model: Option<String>,
    pub wire_model: Option<String>,
}

impl RoutingHints {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        Self {
            provider: get(PROVIDER_HEADER).as_deref().and_then(Provider::parse),
            original_model: get(MODEL_HEADER),
            wire_model: get(WIRE_MODEL_HEADER),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResolution {
    pub provider: Provider,
    /// Model identifier sent upstream
    pub wire_model: String,
    /// Model identifier the caller asked for, echoed back in responses
    pub original_model: String,
}

/// Decide which upstream serves `model` and what model string it receives.
pub fn resolve_provider(
    hints: &RoutingHints,
    model: &str,
    config: &Config,
) -> Result<ProviderResolution, ProxyError> {
    let provider = hints
        .provider
        .or_else(|| infer_provider(model))
        .ok_or_else(|| {
            ProxyError::invalid_request(format!("Unable to infer provider for model {model}"), None)
        })?;

    let wire_model = match provider {
        Provider::OpenRouter => resolve_openrouter_model(
            hints.wire_model.as_deref().unwrap_or(model),
            &config.default_vendor,
        )?,
        Provider::Anthropic => model.to_string(),
    };

    Ok(ProviderResolution {
        provider,
        wire_model,
        original_model: model.to_string(),
    })
}

/// Infer the provider from the model string. Unrecognized models stay native;
/// only an empty model cannot be inferred.
fn infer_provider(model: &str) -> Option<Provider> {
    let normalized = model.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    if normalized.starts_with("or:")
        || normalized.starts_with("openrouter/")
        || normalized.starts_with("openai/")
    {
        return Some(Provider::OpenRouter);
    }
    // "claude*", "anthropic/*" and everything unrecognized
    Some(Provider::Anthropic)
}

/// Strip an ASCII prefix regardless of case
fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn resolve_openrouter_model(model: &str, default_vendor: &str) -> Result<String, ProxyError> {
    if let Some(slug) = strip_prefix_ignore_case(model, "or:") {
        if slug.is_empty() {
            return Err(ProxyError::invalid_request(
                "OpenRouter model prefix \"or:\" must include a slug",
                None,
            ));
        }
        if slug.contains('/') {
            return Ok(slug.to_string());
        }
        return Ok(format!("{default_vendor}/{slug}"));
    }
    if let Some(slug) = strip_prefix_ignore_case(model, "openrouter/") {
        return Ok(slug.to_string());
    }
    Ok(model.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::error::ErrorKind;
    use axum::http::HeaderValue;

    fn config() -> Config {
        Config::from_settings(&Settings::default())
    }

    fn resolve(model: &str) -> Result<ProviderResolution, ProxyError> {
        resolve_provider(&RoutingHints::default(), model, &config())
    }

    #[test]
    fn test_qualified_or_slug_passes_through() {
        for slug in ["anthropic/claude-3.5-sonnet", "meta-llama/llama-3-70b", "x/y/z"] {
            let res = resolve(&format!("or:{slug}")).unwrap();
            assert_eq!(res.provider, Provider::OpenRouter);
            assert_eq!(res.wire_model, slug);
        }
    }

    #[test]
    fn test_unqualified_or_slug_gets_default_vendor() {
        let res = resolve("or:gpt-5-mini").unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
        assert_eq!(res.wire_model, "openai/gpt-5-mini");
        assert_eq!(res.original_model, "or:gpt-5-mini");

        let config = Config::from_settings(&Settings {
            openrouter_default_vendor: Some("Mistralai".to_string()),
            ..Settings::default()
        });
        let res = resolve_provider(&RoutingHints::default(), "or:small", &config).unwrap();
        assert_eq!(res.wire_model, "mistralai/small");
    }

    #[test]
    fn test_native_models() {
        for model in ["claude-3-5", "claude-sonnet-4-5", "anthropic/claude-opus-4"] {
            let res = resolve(model).unwrap();
            assert_eq!(res.provider, Provider::Anthropic);
            assert_eq!(res.wire_model, model);
        }
    }

    #[test]
    fn test_unknown_model_defaults_to_native() {
        let res = resolve("gemini-2.0-flash").unwrap();
        assert_eq!(res.provider, Provider::Anthropic);
        assert_eq!(res.wire_model, "gemini-2.0-flash");
    }

    #[test]
    fn test_routed_prefixes() {
        let res = resolve("openrouter/google/gemini-2.5-pro").unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
        assert_eq!(res.wire_model, "google/gemini-2.5-pro");

        let res = resolve("openai/gpt-4o").unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
        assert_eq!(res.wire_model, "openai/gpt-4o");
    }

    #[test]
    fn test_prefixes_are_case_insensitive() {
        let res = resolve("OR:gpt-5").unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
        assert_eq!(res.wire_model, "openai/gpt-5");
        assert_eq!(res.original_model, "OR:gpt-5");

        let res = resolve("Or:Meta-Llama/llama-3-70b").unwrap();
        assert_eq!(res.wire_model, "Meta-Llama/llama-3-70b");

        let res = resolve("OpenRouter/google/gemini-2.5-pro").unwrap();
        assert_eq!(res.wire_model, "google/gemini-2.5-pro");

        assert!(resolve("OR:").is_err());
    }

    #[test]
    fn test_empty_or_slug_fails() {
        let err = resolve("or:").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_empty_model_fails() {
        let err = resolve("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_header_hints() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("openrouter"));
        headers.insert(MODEL_HEADER, HeaderValue::from_static("claude-sonnet-4-5"));
        headers.insert(WIRE_MODEL_HEADER, HeaderValue::from_static("or:gpt-5"));
        let hints = RoutingHints::from_headers(&headers);
        assert_eq!(hints.provider, Some(Provider::OpenRouter));
        assert_eq!(hints.original_model.as_deref(), Some("claude-sonnet-4-5"));

        // Explicit provider beats inference; wire model hint beats body model
        let res = resolve_provider(&hints, "claude-sonnet-4-5", &config()).unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
        assert_eq!(res.wire_model, "openai/gpt-5");
        assert_eq!(res.original_model, "claude-sonnet-4-5");
    }

    #[test]
    fn test_unknown_provider_hint_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(PROVIDER_HEADER, HeaderValue::from_static("bedrock"));
        let hints = RoutingHints::from_headers(&headers);
        assert_eq!(hints.provider, None);

        let res = resolve_provider(&hints, "or:gpt-5", &config()).unwrap();
        assert_eq!(res.provider, Provider::OpenRouter);
    }
}
