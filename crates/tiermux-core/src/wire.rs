use bytes::Bytes;

/// Minimal incremental SSE frame splitter: accumulates bytes and yields
/// each complete `data: ...\n\n`-terminated event as it completes, so the
/// invoker can count tokens and detect `[DONE]` while still passing the
/// original bytes straight through to the downstream response.
#[derive(Debug, Default)]
pub struct SseFrameParser {
    buf: String,
}

impl SseFrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &Bytes) -> Vec<String> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };
        self.buf.push_str(text);
        self.drain_complete_frames()
    }

    pub fn finish(&mut self) -> Vec<String> {
        let mut out = self.drain_complete_frames();
        let remainder = self.buf.trim();
        if !remainder.is_empty() {
            out.extend(extract_data_lines(remainder));
            self.buf.clear();
        }
        out
    }

    fn drain_complete_frames(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(pos) = self.buf.find("\n\n") {
            let frame = self.buf[..pos].to_string();
            self.buf.drain(..pos + 2);
            out.extend(extract_data_lines(&frame));
        }
        out
    }
}

fn extract_data_lines(frame: &str) -> Vec<String> {
    frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .collect()
}

pub const DONE_MARKER: &str = "[DONE]";

/// Best-effort token-ish count for a streamed text delta: whitespace-split
/// word count. Used only for the audit trace, never for billing.
pub fn approximate_token_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}
