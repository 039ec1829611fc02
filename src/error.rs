use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};

/// Machine-readable error category reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    Authentication,
    Permission,
    RateLimit,
    Api,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request_error",
            ErrorKind::Authentication => "authentication_error",
            ErrorKind::Permission => "permission_error",
            ErrorKind::RateLimit => "rate_limit_error",
            ErrorKind::Api => "api_error",
        }
    }
}

/// A failure with a caller-facing status, kind and optional structured details
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
    pub details: Option<Value>,
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
            retryable: false,
            details: None,
        }
    }

    fn with_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl ProxyError {
    pub fn invalid_request(message: impl Into<String>, details: Option<Value>) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest, message)
            .with_details(details)
            .into()
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::UNAUTHORIZED, ErrorKind::Authentication, message).into()
    }

    #[allow(dead_code)]
    pub fn permission(message: impl Into<String>) -> Self {
        ApiError::new(StatusCode::FORBIDDEN, ErrorKind::Permission, message).into()
    }

    #[allow(dead_code)]
    pub fn rate_limit(message: impl Into<String>, details: Option<Value>) -> Self {
        let mut err = ApiError::new(StatusCode::TOO_MANY_REQUESTS, ErrorKind::RateLimit, message)
            .with_details(details);
        err.retryable = true;
        err.into()
    }

    /// Error reported by an upstream with the given status.
    /// 5xx are retryable `api_error`s, everything else is an `invalid_request_error`.
    #[allow(dead_code)]
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        let server_side = status >= 500;
        let kind = if server_side {
            ErrorKind::Api
        } else {
            ErrorKind::InvalidRequest
        };
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut err = ApiError::new(status, kind, message);
        err.retryable = server_side;
        err.into()
    }

    /// HTTP status the caller will see
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Api(err) => err.status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error kind the caller will see
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Api(err) => err.kind,
            _ => ErrorKind::Api,
        }
    }

    /// Render any error into the caller's JSON error envelope.
    pub fn to_response(&self) -> Response {
        let body = match self {
            ProxyError::Api(err) => {
                let mut body = json!({
                    "type": err.kind.as_str(),
                    "message": err.message,
                    "retryable": err.retryable,
                });
                if let Some(details) = &err.details {
                    body["details"] = details.clone();
                }
                body
            }
            other => json!({
                "type": ErrorKind::Api.as_str(),
                "message": other.to_string(),
                "retryable": false,
            }),
        };

        (
            self.status(),
            [(header::CACHE_CONTROL, "no-store")],
            Json(body),
        )
            .into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.to_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(err: ProxyError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_constructors() {
        let err = ProxyError::rate_limit("slow down", None);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert!(matches!(err, ProxyError::Api(ApiError { retryable: true, .. })));

        let err = ProxyError::permission("nope");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(err.kind().as_str(), "permission_error");

        let err = ProxyError::authentication("Missing API key");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_upstream_error_classification() {
        let err = ProxyError::upstream(503, "unavailable");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.kind(), ErrorKind::Api);
        assert!(matches!(err, ProxyError::Api(ApiError { retryable: true, .. })));

        let err = ProxyError::upstream(404, "missing");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(matches!(err, ProxyError::Api(ApiError { retryable: false, .. })));
    }

    #[tokio::test]
    async fn test_render_structured_error() {
        let (status, body) = render(ProxyError::invalid_request(
            "Server tools require Anthropic provider",
            Some(json!({"tools": ["WebFetchTool_1"]})),
        ))
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["type"], "invalid_request_error");
        assert_eq!(body["message"], "Server tools require Anthropic provider");
        assert_eq!(body["retryable"], false);
        assert_eq!(body["details"]["tools"][0], "WebFetchTool_1");
    }

    #[tokio::test]
    async fn test_render_omits_absent_details() {
        let (_, body) = render(ProxyError::authentication("Missing API key")).await;
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_render_untagged_error() {
        let (status, body) = render(ProxyError::Internal("boom".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["type"], "api_error");
        assert_eq!(body["message"], "boom");
        assert_eq!(body["retryable"], false);
        assert!(body.get("details").is_none());
    }
}
