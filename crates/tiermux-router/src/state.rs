use std::sync::Arc;

use tiermux_core::{AuthProvider, Engine};
use tiermux_core::HealthRegistry;
use tiermux_provider_core::ConfigStore;

/// Everything an axum handler needs, handed out cheaply via `Arc` clones per
/// request (the teacher's `ProxyState`/`AdminState` shape).
#[derive(Clone)]
pub struct GatewayState {
    pub engine: Arc<Engine>,
    pub auth: Arc<dyn AuthProvider>,
    pub config: Arc<dyn ConfigStore>,
    pub health: Arc<HealthRegistry>,
}
