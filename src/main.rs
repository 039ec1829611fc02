mod config;
mod constants;
mod error;
mod provider;
mod routes;
mod server_tools;
mod transforms;

use axum::ServiceExt;
use axum::http::{HeaderValue, Method, header};
use clap::Parser;
use config::{Config, CorsMode};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePath;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_HASH: &str = env!("GIT_HASH");
pub const BUILD_TIME: &str = env!("BUILD_TIME");

/// Shared, read-only per-process state. Requests never mutate it.
pub struct AppState {
    pub config: Config,
    pub http_client: Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        // Shared HTTP client with connection pooling
        let http_client = Client::builder()
            .timeout(config.upstream_timeout)
            .pool_max_idle_per_host(10)
            .build()?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[derive(Parser)]
#[command(name = "castari-gateway")]
#[command(about = "Anthropic Messages gateway with OpenRouter routing")]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, env = "GATEWAY_HOST")]
    host: Option<String>,

    /// Port to bind to
    #[arg(short, long, env = "GATEWAY_PORT")]
    port: Option<u16>,
}

fn cors_layer(mode: &CorsMode) -> CorsLayer {
    let cors_origins = mode.clone();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            let Ok(origin_str) = origin.to_str() else {
                return false;
            };

            match &cors_origins {
                CorsMode::AllowAll => true,
                CorsMode::LocalhostOnly => {
                    let Ok(url) = url::Url::parse(origin_str) else {
                        return false;
                    };
                    matches!(
                        url.host_str(),
                        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
                    )
                }
                CorsMode::AllowList(allowed) => allowed.iter().any(|a| a == origin_str),
            }
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::HeaderName::from_static(constants::API_KEY_HEADER),
            header::HeaderName::from_static(constants::ANTHROPIC_VERSION_HEADER),
            header::HeaderName::from_static(constants::PROVIDER_HEADER),
            header::HeaderName::from_static(constants::MODEL_HEADER),
            header::HeaderName::from_static(constants::WIRE_MODEL_HEADER),
        ])
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::from_env();

    let host = args.host.unwrap_or_else(|| config.host.clone());
    let port = args.port.unwrap_or(config.port);

    match &config.cors_mode {
        CorsMode::AllowAll => info!("CORS: Allowing all origins"),
        CorsMode::LocalhostOnly => info!("CORS: Localhost only"),
        CorsMode::AllowList(list) => info!("CORS: Allowing origins: {:?}", list),
    }
    info!("Anthropic upstream: {}", config.anthropic_url);
    info!("OpenRouter upstream: {}", config.openrouter_url);
    info!(
        "Server tools mode: {:?}, MCP bridge: {}",
        config.server_tools_mode,
        config.mcp_bridge_mode.as_str()
    );

    let cors = cors_layer(&config.cors_mode);
    let state = Arc::new(AppState::new(config)?);

    let app = NormalizePath::trim_trailing_slash(routes::build_router(state).layer(cors));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!(
        "Starting castari-gateway v{}-{} (built {})",
        VERSION, GIT_HASH, BUILD_TIME
    );
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await?;

    Ok(())
}
