use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use tiermux_common::RoutingConfig;
use tiermux_provider_core::{ConfigStore, ConfigStoreError};

/// Loads `RoutingConfig` from a JSON file once at construction and hands out
/// the current snapshot via an `ArcSwap`. In-flight requests keep the
/// snapshot they started with even if `reload` swaps in a new one — matching
/// the teacher's `AppState::global: ArcSwap<GlobalConfig>` pattern.
pub struct FileConfigStore {
    path: PathBuf,
    current: ArcSwap<RoutingConfig>,
}

impl FileConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigStoreError> {
        let path = path.into();
        let config = read_config(&path)?;
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(config),
        })
    }
}

fn read_config(path: &std::path::Path) -> Result<RoutingConfig, ConfigStoreError> {
    RoutingConfig::from_file(path).map_err(|err| match err {
        tiermux_common::RoutingConfigError::Read { source, .. } => {
            ConfigStoreError::Read(source.to_string())
        }
        tiermux_common::RoutingConfigError::Parse { source, .. } => {
            ConfigStoreError::Parse(source.to_string())
        }
    })
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    fn current(&self) -> Arc<RoutingConfig> {
        self.current.load_full()
    }

    async fn reload(&self) -> Result<(), ConfigStoreError> {
        let path = self.path.clone();
        let config = tokio::task::spawn_blocking(move || read_config(&path))
            .await
            .map_err(|err| ConfigStoreError::Read(err.to_string()))??;
        self.current.store(Arc::new(config));
        Ok(())
    }
}
