//! Token accounting. Trusts an upstream-reported `usage` object when one is
//! present; otherwise estimates locally from the request messages and the
//! accumulated assistant text. Local estimation never blocks the response —
//! callers run it after the body (or stream) is fully assembled.

use serde_json::{Map, Value};

use crate::wire::approximate_token_count;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Upstream,
    Local,
}

#[derive(Debug, Clone, Copy)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub source: TokenSource,
}

/// Reads `choices[0].message.content` out of a buffered chat-completion
/// response body.
pub fn extract_choice_text(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

/// Reads a top-level `usage` object with OpenAI-shaped field names, if the
/// upstream reported one.
pub fn extract_usage(value: &Value) -> Option<(u64, u64)> {
    let usage = value.get("usage")?;
    let prompt = usage.get("prompt_tokens")?.as_u64()?;
    let completion = usage.get("completion_tokens")?.as_u64()?;
    Some((prompt, completion))
}

fn messages_text(body: &Map<String, Value>) -> String {
    let Some(messages) = body.get("messages").and_then(Value::as_array) else {
        return String::new();
    };
    messages
        .iter()
        .filter_map(|m| m.get("content").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Computes prompt/completion token counts, preferring the upstream-reported
/// `usage` object (parsed from `upstream_body_json`, if any) and falling
/// back to the local whitespace-based estimator over the request messages
/// and the assembled assistant text.
pub fn account(
    request_body: &Map<String, Value>,
    assistant_text: &str,
    upstream_body_json: Option<&Value>,
) -> Usage {
    if let Some((prompt_tokens, completion_tokens)) = upstream_body_json.and_then(extract_usage) {
        return Usage {
            prompt_tokens,
            completion_tokens,
            source: TokenSource::Upstream,
        };
    }

    Usage {
        prompt_tokens: approximate_token_count(&messages_text(request_body)),
        completion_tokens: approximate_token_count(assistant_text),
        source: TokenSource::Local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_upstream_usage_when_present() {
        let body = serde_json::json!({"usage": {"prompt_tokens": 10, "completion_tokens": 5}});
        let req = Map::new();
        let usage = account(&req, "irrelevant text here", Some(&body));
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.source, TokenSource::Upstream);
    }

    #[test]
    fn falls_back_to_local_estimate_without_usage() {
        let mut req = Map::new();
        req.insert(
            "messages".to_string(),
            serde_json::json!([{"role": "user", "content": "one two three"}]),
        );
        let usage = account(&req, "four five", None);
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.source, TokenSource::Local);
    }

    #[test]
    fn extract_choice_text_reads_message_content() {
        let body = br#"{"choices":[{"message":{"content":"hello there"}}]}"#;
        assert_eq!(extract_choice_text(body), Some("hello there".to_string()));
    }
}
