use std::collections::HashMap;

use serde_json::{Map, Value};
use serde::{Deserialize, Serialize};

/// The `params` section: default request-body parameters, applied globally
/// and then overridden per model. Overrides replace a key's whole value —
/// nested objects like `response_format` are swapped wholesale, never
/// deep-merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamsConfig {
    #[serde(default)]
    pub global_params: Map<String, Value>,
    #[serde(default)]
    pub model_params: HashMap<String, Map<String, Value>>,
}

impl ParamsConfig {
    pub fn overrides_for(&self, model: &str) -> Option<&Map<String, Value>> {
        self.model_params.get(model)
    }
}
