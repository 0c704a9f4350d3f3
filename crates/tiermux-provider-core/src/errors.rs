use std::error::Error;
use std::fmt;

pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone)]
pub enum ProviderError {
    InvalidConfig(String),
    MissingField(&'static str),
    Other(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::InvalidConfig(msg) => write!(f, "invalid provider config: {msg}"),
            ProviderError::MissingField(field) => write!(f, "missing provider field: {field}"),
            ProviderError::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl Error for ProviderError {}
