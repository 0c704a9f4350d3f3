//! The routing engine: request classification, candidate selection,
//! upstream invocation, retry/failover, health scoring, and tracing.
//!
//! This crate owns the whole decision pipeline end to end; the north-side
//! HTTP surface lives in `tiermux-router`, which drives this crate's
//! `engine` module.

pub mod auth;
pub mod classify;
pub mod engine;
pub mod error;
pub mod health;
pub mod invoker;
pub mod params;
pub mod registry;
pub mod selector;
pub mod tokens;
pub mod trace;
pub mod upstream_client;
pub mod wire;

mod orchestrator;

pub use auth::{AuthProvider, BearerKeyAuth};
pub use classify::classify_tier;
pub use engine::{Engine, GatewayOutcome};
pub use error::RoutingError;
pub use health::HealthRegistry;
pub use orchestrator::Outcome;
pub use trace::TraceRecorder;
pub use upstream_client::{UpstreamClient, WreqUpstreamClient};
