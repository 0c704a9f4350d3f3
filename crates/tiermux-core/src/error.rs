/// The closed set of failures the gateway can surface to a caller, or use
/// internally to decide whether an attempt is retryable.
#[derive(Debug, thiserror::Error)]
pub enum RoutingError {
    #[error("request body is not valid JSON: {0}")]
    BadRequest(String),
    #[error("no provider is configured for model {0:?}")]
    ProviderMissing(String),
    #[error("transport error reaching upstream: {0}")]
    TransportError(String),
    #[error("timed out connecting to upstream")]
    ConnectTimeout,
    #[error("timed out waiting for upstream generation")]
    GenerationTimeout,
    #[error("upstream returned status {code}")]
    UpstreamStatus { code: u16, body: bytes::Bytes },
    #[error("upstream returned an empty response")]
    EmptyResponse,
    #[error("upstream response body matched a configured error keyword")]
    BodyKeyword,
    #[error("stream aborted mid-response")]
    StreamAbort,
    #[error("candidate pool exhausted after {} attempt(s): {last_reason}", attempted.len())]
    Exhausted {
        attempted: Vec<String>,
        last_reason: String,
    },
    #[error("client disconnected before a response was produced")]
    ClientAbort,
    #[error("caller is not authorized")]
    Unauthorized,
}

impl RoutingError {
    /// Maps this error to the HTTP status the gateway should return when it
    /// is terminal (i.e. not swallowed by the retry orchestrator).
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            RoutingError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RoutingError::Unauthorized => StatusCode::UNAUTHORIZED,
            RoutingError::ProviderMissing(_) => StatusCode::NOT_FOUND,
            RoutingError::ClientAbort => StatusCode::BAD_REQUEST,
            RoutingError::UpstreamStatus { code, .. } => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RoutingError::Exhausted { .. }
            | RoutingError::TransportError(_)
            | RoutingError::ConnectTimeout
            | RoutingError::GenerationTimeout
            | RoutingError::EmptyResponse
            | RoutingError::BodyKeyword
            | RoutingError::StreamAbort => StatusCode::BAD_GATEWAY,
        }
    }
}
