use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved `(provider_id, model)` pair. Canonical string form is
/// `"provider/model"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRef {
    pub provider_id: String,
    pub model: String,
}

impl ModelRef {
    pub fn new(provider_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model: model.into(),
        }
    }

    /// Splits a canonical `"provider/model"` string at the first `/`.
    /// Returns `None` if there is no slash — callers must consult the
    /// model→provider map or the default upstream provider in that case.
    pub fn split_explicit(raw: &str) -> Option<(&str, &str)> {
        raw.split_once('/')
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_first_slash_only() {
        assert_eq!(
            ModelRef::split_explicit("openai/gpt-4/preview"),
            Some(("openai", "gpt-4/preview"))
        );
        assert_eq!(ModelRef::split_explicit("gpt-4"), None);
    }

    #[test]
    fn display_is_canonical_form() {
        let model_ref = ModelRef::new("openai", "gpt-4");
        assert_eq!(model_ref.to_string(), "openai/gpt-4");
    }
}
