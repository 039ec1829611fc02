use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{BUILD_TIME, GIT_HASH, VERSION};

/// Build identity reported by `/version`
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub git_hash: &'static str,
    pub build_time: &'static str,
}

/// Liveness probe. The gateway holds no state that could make it unhealthy.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn version() -> Json<VersionInfo> {
    Json(VersionInfo {
        version: VERSION,
        git_hash: GIT_HASH,
        build_time: BUILD_TIME,
    })
}
