use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::Response;

use crate::state::GatewayState;

/// Gates a route behind the configured gateway API key, matching the
/// teacher's `admin_auth` middleware-over-trait shape.
pub async fn require_gateway_key(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    state
        .auth
        .authenticate(&headers)
        .map_err(|_| StatusCode::UNAUTHORIZED)?;
    Ok(next.run(req).await)
}
