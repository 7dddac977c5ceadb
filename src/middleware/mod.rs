// Authentication, caller identity, and CORS middleware

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::ApiError;
use crate::routes::AppState;

/// Header naming the CRM user acting on a dialer request
pub const USER_ID_HEADER: &str = "x-user-id";

/// Authentication middleware
///
/// Verifies the API key in the Authorization header or x-api-key header.
/// Expects format: "Bearer {PROXY_API_KEY}" or just the key in x-api-key.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let expected = state.config.proxy_api_key.as_str();

    if let Some(auth_header) = request.headers().get("authorization") {
        if let Ok(auth_str) = auth_header.to_str() {
            if auth_str.strip_prefix("Bearer ") == Some(expected) {
                return Ok(next.run(request).await);
            }
        }
    }

    if let Some(api_key_header) = request.headers().get("x-api-key") {
        if api_key_header.to_str().ok() == Some(expected) {
            return Ok(next.run(request).await);
        }
    }

    let path = request.uri().path();
    let method = request.method();
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
    tracing::warn!(
        "[{}] Access attempt with invalid or missing API key: {} {}",
        request_id,
        method,
        path
    );
    Err(ApiError::Unauthorized(
        "Invalid or missing API Key".to_string(),
    ))
}

/// Id of the CRM user on whose behalf the request is made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AgentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| AgentUser(v.to_string()))
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_ID_HEADER)))
    }
}

/// Create CORS middleware layer
///
/// An empty origin list allows every origin. Entries starting with `*`
/// match any origin ending in the rest of the entry.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let origins = origins.to_vec();
    layer.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|origin| origin_allowed(&origins, origin))
                .unwrap_or(false)
        },
    ))
}

fn origin_allowed(allowed: &[String], origin: &str) -> bool {
    allowed.iter().any(|o| match o.strip_prefix('*') {
        Some(suffix) => origin.ends_with(suffix),
        None => origin == o,
    })
}
