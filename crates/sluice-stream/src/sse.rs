use tracing::trace;

use crate::framer::LineFragment;

/// Sentinel payload that marks the end of the transport stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// The payload of one complete `data:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsePayload {
    pub line_nr: usize,
    pub data: String,
    pub is_done: bool,
}

/// Pulls `data:` payloads out of framed line fragments.
///
/// Fragments are buffered until their line completes; blank lines, `:`
/// comments and other SSE fields (`event:`, `id:`, `retry:`) are dropped.
#[derive(Debug, Default)]
pub struct EventLineExtractor {
    line: String,
}

impl EventLineExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: LineFragment, emit: &mut impl FnMut(SsePayload)) {
        self.line.push_str(&fragment.text);
        if !fragment.line_complete {
            return;
        }

        let line = std::mem::take(&mut self.line);
        if let Some(payload) = parse_data_line(&line, fragment.line_nr) {
            emit(payload);
        }
    }
}

/// Parse a complete line (terminator included or not) into a payload.
pub fn parse_data_line(line: &str, line_nr: usize) -> Option<SsePayload> {
    let line = line.trim_end_matches(['\n', '\r']);
    let Some(data) = line.strip_prefix("data:") else {
        if !line.is_empty() {
            trace!(line_nr, "non-data line dropped");
        }
        return None;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);

    Some(SsePayload {
        line_nr,
        data: data.to_string(),
        is_done: data == DONE_SENTINEL,
    })
}
