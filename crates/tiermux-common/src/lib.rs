//! Typed configuration document for the routing engine.
//!
//! The source threads nested JSON maps through every layer; here the whole
//! document is parsed once into a frozen struct tree and handed to callers as
//! `&RoutingConfig` (or behind an `arc_swap::ArcSwap` at the state layer).
//! Parameter lookups become method calls, not key gymnastics.

pub mod config;
pub mod model_ref;
pub mod tier;

pub use config::{
    GeneralConfig, HealthConfig, ModelsConfig, ParamsConfig, Protocol, ProviderEndpoint,
    ProvidersConfig, RetryConditions, RetriesConfig, RoutingConfig, RoutingConfigError,
    RouterConfig, Strategy, TierMillis, TierU32, TimeoutsConfig,
};
pub use model_ref::ModelRef;
pub use tier::{Tier, find_tier_in_text};
