use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The implicit provider id used whenever a bare model name carries no
/// `model_provider_map`/`map` entry of its own.
pub const UPSTREAM_PROVIDER_ID: &str = "upstream";

/// Wire protocol an upstream endpoint speaks. The gateway itself only ever
/// exposes the chat-completions shape; this selects how a request is
/// translated when it leaves the building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    #[serde(rename = "openai")]
    OpenAi,
    V1Messages,
    V1Response,
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::OpenAi
    }
}

/// A single upstream provider: one base URL, one credential, one protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub base_url: String,
    pub api_key: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_true")]
    pub verify_ssl: bool,
}

fn default_true() -> bool {
    true
}

/// The `providers` section of the configuration document: the default
/// (`upstream`) endpoint, any additional named (`custom`) endpoints, and the
/// map that resolves a bare model name (no `provider/` prefix) to one of
/// them. A bare model name with no `map` entry always falls back to
/// `upstream`, regardless of how many `custom` providers are configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub upstream: ProviderEndpoint,
    #[serde(default)]
    pub custom: HashMap<String, ProviderEndpoint>,
    #[serde(default)]
    pub map: HashMap<String, String>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            upstream: ProviderEndpoint {
                base_url: String::new(),
                api_key: String::new(),
                protocol: Protocol::default(),
                verify_ssl: true,
            },
            custom: HashMap::new(),
            map: HashMap::new(),
        }
    }
}

impl ProvidersConfig {
    /// Fetches a provider endpoint by id. `"upstream"` always resolves to the
    /// default endpoint; any other id is looked up in `custom`.
    pub fn get(&self, provider_id: &str) -> Option<&ProviderEndpoint> {
        if provider_id == UPSTREAM_PROVIDER_ID {
            Some(&self.upstream)
        } else {
            self.custom.get(provider_id)
        }
    }

    /// Resolves the provider id that should serve a bare (unqualified) model
    /// name: the `map` entry if one exists, else the implicit `upstream`
    /// provider — unconditionally, independent of how many `custom`
    /// providers are configured.
    pub fn provider_id_for(&self, model: &str) -> &str {
        self.map
            .get(model)
            .map(String::as_str)
            .unwrap_or(UPSTREAM_PROVIDER_ID)
    }
}
