use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use super::handlers::ApiError;
use super::server::ApiState;
use crate::error::UmbreldError;

/// Reject requests without a valid `Authorization: Bearer` token
pub async fn require_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| state.auth.verify_token(token.trim()));

    if !authorized {
        debug!("Rejected unauthenticated call to {}", request.uri().path());
        return Err(UmbreldError::Unauthorized.into());
    }

    Ok(next.run(request).await)
}
