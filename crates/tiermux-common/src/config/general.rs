use serde::{Deserialize, Serialize};

/// The `general` section: catch-all gateway-level settings that don't
/// belong to any one component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Bearer key callers must present. `None` disables inbound auth
    /// entirely (e.g. behind a trusted internal network).
    #[serde(default)]
    pub gateway_api_key: Option<String>,
}
