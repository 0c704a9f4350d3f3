mod general;
mod health;
mod models;
mod params;
mod provider;
mod retries;
mod router;
mod timeouts;

pub use general::GeneralConfig;
pub use health::HealthConfig;
pub use models::{ModelsConfig, Strategy};
pub use params::ParamsConfig;
pub use provider::{Protocol, ProviderEndpoint, ProvidersConfig};
pub use retries::{RetriesConfig, RetryConditions, TierU32};
pub use router::RouterConfig;
pub use timeouts::{TierMillis, TimeoutsConfig};

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The full configuration document, parsed once at startup and handed
/// around as `&RoutingConfig` (or behind an `arc_swap::ArcSwap` for
/// hot-reload) by everything downstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retries: RetriesConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub params: ParamsConfig,
    #[serde(default)]
    pub general: GeneralConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum RoutingConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl RoutingConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RoutingConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| RoutingConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| RoutingConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }
}
