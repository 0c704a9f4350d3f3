use std::time::Duration;

use bytes::Bytes;
use serde_json::{Map, Value};
use tiermux_common::{ParamsConfig, ProviderEndpoint, Protocol, Tier, TimeoutsConfig};
use tiermux_provider_core::{HttpMethod, UpstreamHttpRequest, UpstreamHttpResponse, header_set};

use crate::error::RoutingError;
use crate::params::merge_params;
use crate::upstream_client::UpstreamClient;

/// Synthetic header the invoker uses to carry a provider's TLS-verification
/// setting down to the transport layer, which has no other per-request way
/// to learn it.
const VERIFY_SSL_HEADER: &str = "x-tiermux-verify-ssl";

fn chat_path(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::OpenAi => "/chat/completions",
        Protocol::V1Messages => "/messages",
        Protocol::V1Response => "/responses",
    }
}

/// `v1-messages` and `v1-response` upstreams never speak SSE: the gateway
/// still has to serve a streaming client, but by synthesizing a single
/// chunk from the buffered reply rather than asking the upstream to stream.
pub fn effective_stream(protocol: Protocol, requested: bool) -> bool {
    requested && matches!(protocol, Protocol::OpenAi)
}

/// Invokes one candidate model: merges configured parameter defaults into
/// the caller's request body, resolves the tier's two-phase timeout budget,
/// and sends the request through the upstream client.
pub async fn invoke(
    client: &dyn UpstreamClient,
    endpoint: &ProviderEndpoint,
    model: &str,
    params: &ParamsConfig,
    timeouts: &TimeoutsConfig,
    tier: Tier,
    mut body: Map<String, Value>,
    is_stream: bool,
) -> Result<UpstreamHttpResponse, RoutingError> {
    let effective_stream = effective_stream(endpoint.protocol, is_stream);
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert("stream".to_string(), Value::Bool(effective_stream));
    merge_params(params, model, &mut body);

    let payload = serde_json::to_vec(&Value::Object(body))
        .map_err(|err| RoutingError::BadRequest(err.to_string()))?;

    let mut headers = vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("authorization".to_string(), format!("Bearer {}", endpoint.api_key)),
    ];
    header_set(&mut headers, VERIFY_SSL_HEADER, endpoint.verify_ssl.to_string());

    let request = UpstreamHttpRequest {
        method: HttpMethod::Post,
        url: format!(
            "{}{}",
            endpoint.base_url.trim_end_matches('/'),
            chat_path(endpoint.protocol)
        ),
        headers,
        body: Some(Bytes::from(payload)),
        is_stream: effective_stream,
    };

    let connect_timeout = Duration::from_millis(timeouts.connect_ms.get(tier));
    let generation_timeout = Duration::from_millis(timeouts.generation_ms.get(tier));

    client
        .send(request, connect_timeout, generation_timeout)
        .await
        .map_err(routing_error_for_failure)
}

fn routing_error_for_failure(failure: tiermux_provider_core::UpstreamFailure) -> RoutingError {
    use tiermux_provider_core::UpstreamTransportErrorKind::*;
    match failure {
        tiermux_provider_core::UpstreamFailure::Transport { kind, message } => match kind {
            ConnectTimeout => RoutingError::ConnectTimeout,
            ReadTimeout => RoutingError::GenerationTimeout,
            Connect | Dns | Tls | Other => RoutingError::TransportError(message),
        },
    }
}
