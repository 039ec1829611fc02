/// Default native (Anthropic) upstream base URL
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";

/// Default routed (OpenRouter) upstream base URL
pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";

/// Path suffix of the Anthropic Messages endpoint
pub const ANTHROPIC_MESSAGES_PATH: &str = "/v1/messages";

/// Path suffix of the OpenRouter chat completions endpoint
pub const OPENROUTER_COMPLETIONS_PATH: &str = "/v1/chat/completions";

/// Vendor prepended to unqualified `or:` slugs when none is configured
pub const DEFAULT_OPENROUTER_VENDOR: &str = "openai";

/// Default timeout for a single upstream call (long generations stream for minutes)
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 300;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8787;

// Inbound routing headers set by cooperating clients
pub const PROVIDER_HEADER: &str = "x-castari-provider";
pub const MODEL_HEADER: &str = "x-castari-model";
pub const WIRE_MODEL_HEADER: &str = "x-castari-wire-model";

/// Caller API key header (also the credential header sent to the native upstream)
pub const API_KEY_HEADER: &str = "x-api-key";

/// Anthropic API version header, relayed to the native upstream when present
pub const ANTHROPIC_VERSION_HEADER: &str = "anthropic-version";
