use http::HeaderMap;

use crate::error::RoutingError;

/// Verifies the caller is allowed to use the gateway. A `None` configured
/// key disables auth entirely (trusted-network deployments).
pub trait AuthProvider: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), RoutingError>;
}

pub struct BearerKeyAuth {
    key: Option<String>,
}

impl BearerKeyAuth {
    pub fn new(key: Option<String>) -> Self {
        Self { key }
    }
}

impl AuthProvider for BearerKeyAuth {
    fn authenticate(&self, headers: &HeaderMap) -> Result<(), RoutingError> {
        let Some(expected) = self.key.as_deref() else {
            return Ok(());
        };
        let presented = extract_bearer(headers).ok_or(RoutingError::Unauthorized)?;
        if presented == expected {
            Ok(())
        } else {
            Err(RoutingError::Unauthorized)
        }
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(http::header::AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))
        .map(|token| token.trim().to_string())
}
