use std::time::Duration;

use bytes::Bytes;

use crate::headers::{Headers, header_get};

pub type ByteStream = tokio::sync::mpsc::Receiver<Bytes>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

#[derive(Debug)]
pub enum UpstreamBody {
    Bytes(Bytes),
    Stream(ByteStream),
}

#[derive(Debug, Clone)]
pub struct UpstreamHttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: Option<Bytes>,
    pub is_stream: bool,
}

#[derive(Debug)]
pub struct UpstreamHttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: UpstreamBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum UpstreamTransportErrorKind {
    ConnectTimeout,
    ReadTimeout,
    Connect,
    Dns,
    Tls,
    Other,
}

/// Everything that can go wrong reaching (or reading from) an upstream, short
/// of the upstream returning a well-formed non-2xx HTTP response — those are
/// reported as a normal `UpstreamHttpResponse` and judged by the retry
/// conditions instead.
#[derive(Debug, Clone)]
pub enum UpstreamFailure {
    Transport {
        kind: UpstreamTransportErrorKind,
        message: String,
    },
}

impl UpstreamFailure {
    pub fn is_connect_timeout(&self) -> bool {
        matches!(
            self,
            UpstreamFailure::Transport {
                kind: UpstreamTransportErrorKind::ConnectTimeout,
                ..
            }
        )
    }
}

pub fn retry_after_seconds(headers: &Headers) -> Option<Duration> {
    let value = header_get(headers, "retry-after")?.trim();
    let secs = value.parse::<u64>().ok()?;
    Some(Duration::from_secs(secs))
}
