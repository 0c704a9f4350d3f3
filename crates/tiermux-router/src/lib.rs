//! The north-side HTTP surface: an `axum::Router` that authenticates
//! callers, parses their chat-completion request, and drives
//! `tiermux_core::Engine` to produce a response.

mod auth;
mod handler;
mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

pub use state::GatewayState;

/// Builds the gateway's router. `/healthz` is left unauthenticated;
/// `/v1/chat/completions` and `/metrics` sit behind the gateway API key.
pub fn router(state: GatewayState) -> Router {
    let guarded = Router::new()
        .route("/v1/chat/completions", post(handler::chat_completions))
        .route("/metrics", get(handler::metrics))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_gateway_key,
        ));

    Router::new()
        .route("/healthz", get(handler::healthz))
        .merge(guarded)
        .with_state(state)
}
