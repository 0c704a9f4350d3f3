use tiermux_common::{ProviderEndpoint, ProvidersConfig};
use tiermux_common::ModelRef;

use crate::error::RoutingError;

/// Resolves a model name from a tier's candidate pool into a concrete
/// `(ProviderEndpoint, model)` pair. A `provider/model` entry names its
/// provider explicitly; a bare model name falls back to the configured
/// `providers.map`, then to the implicit `upstream` provider.
pub struct ProviderRegistry<'a> {
    providers: &'a ProvidersConfig,
}

impl<'a> ProviderRegistry<'a> {
    pub fn new(providers: &'a ProvidersConfig) -> Self {
        Self { providers }
    }

    pub fn resolve(&self, candidate: &str) -> Result<(&'a ProviderEndpoint, ModelRef), RoutingError> {
        if let Some((provider_id, model)) = ModelRef::split_explicit(candidate) {
            let endpoint = self
                .providers
                .get(provider_id)
                .ok_or_else(|| RoutingError::ProviderMissing(candidate.to_string()))?;
            return Ok((endpoint, ModelRef::new(provider_id, model)));
        }

        let provider_id = self.providers.provider_id_for(candidate);
        let endpoint = self
            .providers
            .get(provider_id)
            .ok_or_else(|| RoutingError::ProviderMissing(candidate.to_string()))?;
        Ok((endpoint, ModelRef::new(provider_id, candidate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tiermux_common::Protocol;

    fn endpoint(host: &str) -> ProviderEndpoint {
        ProviderEndpoint {
            base_url: format!("https://{host}.example.com"),
            api_key: "key".to_string(),
            protocol: Protocol::OpenAi,
            verify_ssl: true,
        }
    }

    #[test]
    fn explicit_provider_prefix_resolves_directly() {
        let providers = ProvidersConfig {
            upstream: endpoint("openai"),
            custom: HashMap::from([("anthropic".to_string(), endpoint("anthropic"))]),
            map: HashMap::new(),
        };
        let registry = ProviderRegistry::new(&providers);
        let (ep, model) = registry.resolve("anthropic/claude-3").unwrap();
        assert_eq!(ep.base_url, "https://anthropic.example.com");
        assert_eq!(model.model, "claude-3");
    }

    #[test]
    fn bare_model_with_no_map_entry_falls_back_to_upstream() {
        let providers = ProvidersConfig {
            upstream: endpoint("openai"),
            custom: HashMap::new(),
            map: HashMap::new(),
        };
        let registry = ProviderRegistry::new(&providers);
        let (ep, model) = registry.resolve("gpt-4o-mini").unwrap();
        assert_eq!(ep.base_url, "https://openai.example.com");
        assert_eq!(model.provider_id, "upstream");
    }

    #[test]
    fn bare_model_falls_back_to_upstream_even_with_custom_providers_configured() {
        // A second (custom) provider must not break the implicit fallback
        // for a bare model name that has no `map` entry of its own.
        let providers = ProvidersConfig {
            upstream: endpoint("openai"),
            custom: HashMap::from([("anthropic".to_string(), endpoint("anthropic"))]),
            map: HashMap::new(),
        };
        let registry = ProviderRegistry::new(&providers);
        let (ep, model) = registry.resolve("gpt-4o-mini").unwrap();
        assert_eq!(ep.base_url, "https://openai.example.com");
        assert_eq!(model.provider_id, "upstream");
    }

    #[test]
    fn bare_model_with_a_map_entry_resolves_to_the_mapped_custom_provider() {
        let providers = ProvidersConfig {
            upstream: endpoint("openai"),
            custom: HashMap::from([("anthropic".to_string(), endpoint("anthropic"))]),
            map: HashMap::from([("claude-3".to_string(), "anthropic".to_string())]),
        };
        let registry = ProviderRegistry::new(&providers);
        let (ep, model) = registry.resolve("claude-3").unwrap();
        assert_eq!(ep.base_url, "https://anthropic.example.com");
        assert_eq!(model.provider_id, "anthropic");
    }

    #[test]
    fn unresolvable_explicit_provider_is_provider_missing() {
        let providers = ProvidersConfig {
            upstream: endpoint("openai"),
            custom: HashMap::new(),
            map: HashMap::new(),
        };
        let registry = ProviderRegistry::new(&providers);
        assert!(matches!(
            registry.resolve("anthropic/claude-3"),
            Err(RoutingError::ProviderMissing(_))
        ));
    }
}
