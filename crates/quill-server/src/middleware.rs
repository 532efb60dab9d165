//! Middleware for the REST API server.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Create CORS middleware.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Request logging middleware.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

/// What the caller may do, attached to every request by [`auth_middleware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// No credentials: published posts only, no writes.
    Public,
    /// Valid API key: writes allowed, inactive and future posts visible.
    Privileged,
}

impl Access {
    pub fn is_privileged(self) -> bool {
        self == Access::Privileged
    }

    /// Fail unless the caller presented the API key.
    pub fn require_privileged(self) -> ApiResult<()> {
        if self.is_privileged() {
            Ok(())
        } else {
            Err(ApiError::unauthorized("A valid API key is required"))
        }
    }
}

/// API key authentication middleware.
///
/// Requests without an `Authorization` header continue as [`Access::Public`].
/// A header carrying the wrong key is rejected outright.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let access = match auth_header {
        None => Access::Public,
        Some(header) => {
            let token = header
                .strip_prefix("Bearer ")
                .or_else(|| header.strip_prefix("Token "));
            match token {
                Some(token) if state.accepts_token(token) => Access::Privileged,
                _ => {
                    warn!(uri = %request.uri(), "Rejected request with invalid API key");
                    return ApiError::unauthorized("Invalid API key").into_response();
                }
            }
        }
    };

    request.extensions_mut().insert(access);
    next.run(request).await
}
