use serde::{Deserialize, Serialize};

/// The `router` section: configuration for the optional intent classifier
/// that picks a tier before candidate selection runs. When `enabled` is
/// false, the gateway falls back to a fixed tier — `t1` unless
/// `legacy_random_tier` opts into the source behavior of picking a tier at
/// random.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Off by default. When the classifier is disabled, the source picked a
    /// uniformly random tier per request; this flag exists purely to
    /// reproduce that behavior for callers who relied on it.
    #[serde(default)]
    pub legacy_random_tier: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: String::new(),
            base_url: String::new(),
            api_key: String::new(),
            verify_ssl: true,
            prompt_template: None,
            legacy_random_tier: false,
        }
    }
}
