use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use wreq::Client;

use tiermux_provider_core::{
    Headers, HttpMethod, UpstreamBody, UpstreamFailure, UpstreamHttpRequest, UpstreamHttpResponse,
    UpstreamTransportErrorKind,
};

/// Two-phase-timeout HTTP client abstraction: the connect phase and the
/// generation (read) phase are budgeted separately, matching the tiered
/// timeout table in `RoutingConfig::timeouts`.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(
        &self,
        req: UpstreamHttpRequest,
        connect_timeout: Duration,
        generation_timeout: Duration,
    ) -> Result<UpstreamHttpResponse, UpstreamFailure>;
}

/// Streaming chunks are handed back on a bounded channel so the caller can
/// forward bytes to the downstream response while this task keeps reading.
const STREAM_CHANNEL_CAPACITY: usize = 16;

pub struct WreqUpstreamClient {
    clients: Mutex<HashMap<bool, Client>>,
}

impl Default for WreqUpstreamClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WreqUpstreamClient {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, verify_ssl: bool) -> Result<Client, UpstreamFailure> {
        let mut guard = self.clients.lock().unwrap();
        if let Some(client) = guard.get(&verify_ssl) {
            return Ok(client.clone());
        }
        let mut builder = Client::builder();
        if !verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(map_wreq_error)?;
        guard.insert(verify_ssl, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl UpstreamClient for WreqUpstreamClient {
    async fn send(
        &self,
        req: UpstreamHttpRequest,
        connect_timeout: Duration,
        generation_timeout: Duration,
    ) -> Result<UpstreamHttpResponse, UpstreamFailure> {
        // `verify_ssl` travels with the request via a synthetic header set by
        // the invoker, since the wire request shape itself is protocol-agnostic.
        let verify_ssl = req
            .headers
            .iter()
            .find(|(k, _)| k == "x-tiermux-verify-ssl")
            .map(|(_, v)| v != "false")
            .unwrap_or(true);
        let client = self.client_for(verify_ssl)?;

        let method = match req.method {
            HttpMethod::Get => wreq::Method::GET,
            HttpMethod::Post => wreq::Method::POST,
        };
        let mut builder = client
            .request(method, &req.url)
            .timeout(connect_timeout.saturating_add(generation_timeout))
            .read_timeout(generation_timeout);

        for (key, value) in &req.headers {
            if key == "x-tiermux-verify-ssl" {
                continue;
            }
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }

        let response = tokio::time::timeout(connect_timeout, builder.send())
            .await
            .map_err(|_| UpstreamFailure::Transport {
                kind: UpstreamTransportErrorKind::ConnectTimeout,
                message: "connect timeout".to_string(),
            })?
            .map_err(map_wreq_error)?;

        convert_response(response, req.is_stream, generation_timeout).await
    }
}

async fn convert_response(
    response: wreq::Response,
    want_stream: bool,
    generation_timeout: Duration,
) -> Result<UpstreamHttpResponse, UpstreamFailure> {
    let status = response.status().as_u16();
    let headers = headers_from_wreq(response.headers());
    let is_success = (200..300).contains(&status);

    if !is_success || !want_stream {
        let body = response.bytes().await.map_err(map_wreq_error)?;
        return Ok(UpstreamHttpResponse {
            status,
            headers,
            body: UpstreamBody::Bytes(body),
        });
    }

    let (tx, rx) = tokio::sync::mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(generation_timeout, stream.next()).await;
            let Ok(item) = next else { break };
            let Some(item) = item else { break };
            let Ok(chunk) = item else { break };
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    Ok(UpstreamHttpResponse {
        status,
        headers,
        body: UpstreamBody::Stream(rx),
    })
}

fn headers_from_wreq(map: &wreq::header::HeaderMap) -> Headers {
    let mut out = Vec::new();
    for (key, value) in map {
        if let Ok(value) = value.to_str() {
            out.push((key.as_str().to_string(), value.to_string()));
        }
    }
    out
}

fn map_wreq_error(err: wreq::Error) -> UpstreamFailure {
    let message = err.to_string().to_ascii_lowercase();
    let kind = if err.is_timeout() {
        if message.contains("read") {
            UpstreamTransportErrorKind::ReadTimeout
        } else {
            UpstreamTransportErrorKind::ConnectTimeout
        }
    } else if err.is_connect() {
        if message.contains("dns") || message.contains("resolve") {
            UpstreamTransportErrorKind::Dns
        } else if message.contains("tls") || message.contains("ssl") {
            UpstreamTransportErrorKind::Tls
        } else {
            UpstreamTransportErrorKind::Connect
        }
    } else {
        UpstreamTransportErrorKind::Other
    };
    UpstreamFailure::Transport {
        kind,
        message: err.to_string(),
    }
}
