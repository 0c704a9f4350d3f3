//! Provider-facing abstractions shared by the routing engine and its
//! storage backends.
//!
//! This crate intentionally does not depend on axum or any concrete HTTP
//! client: it defines the request/response shape an upstream call takes and
//! the traits (`ConfigStore`, `LogSink`, `StatsStore`) that let the engine's
//! core logic stay agnostic of where configuration, logs, and health state
//! actually live.

pub mod collaborators;
pub mod errors;
pub mod headers;
pub mod provider;
pub mod runtime;

pub use collaborators::{
    ConfigStore, ConfigStoreError, LogSink, NoopLogSink, NoopStatsStore, StatsStore,
    StatsStoreError,
};
pub use errors::{ProviderError, ProviderResult};
pub use headers::{Headers, header_get, header_set};
pub use provider::{
    ByteStream, HttpMethod, UpstreamBody, UpstreamFailure, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamTransportErrorKind, retry_after_seconds,
};
pub use runtime::{ModelStats, OutcomeKind, RequestLog, TraceEvent};
