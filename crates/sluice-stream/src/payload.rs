use serde_json::Value;
use tracing::debug;

use crate::sse::SsePayload;

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedPayload {
    /// The transport sent its end sentinel. Not parsed.
    Done { line_nr: usize },
    Json { line_nr: usize, value: Value },
}

/// Parses SSE payloads as JSON, dropping anything that is not.
///
/// Providers interleave keep-alive and status noise with real payloads, so a
/// parse failure is expected traffic and never surfaces as an error.
#[derive(Debug, Default)]
pub struct PayloadDecoder {
    dropped: usize,
}

impl PayloadDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, payload: SsePayload, emit: &mut impl FnMut(DecodedPayload)) {
        if payload.is_done {
            emit(DecodedPayload::Done {
                line_nr: payload.line_nr,
            });
            return;
        }

        match serde_json::from_str::<Value>(&payload.data) {
            Ok(value) => emit(DecodedPayload::Json {
                line_nr: payload.line_nr,
                value,
            }),
            Err(e) => {
                self.dropped += 1;
                debug!(line_nr = payload.line_nr, error = %e, "non-JSON payload dropped");
            }
        }
    }

    /// Payloads discarded as noise so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(data: &str) -> SsePayload {
        SsePayload {
            line_nr: 7,
            data: data.to_string(),
            is_done: data == crate::sse::DONE_SENTINEL,
        }
    }

    fn decode(decoder: &mut PayloadDecoder, data: &str) -> Vec<DecodedPayload> {
        let mut out = Vec::new();
        decoder.decode(payload(data), &mut |d| out.push(d));
        out
    }

    #[test]
    fn json_carries_line_number() {
        let mut decoder = PayloadDecoder::new();
        let out = decode(&mut decoder, r#"{"id":"x"}"#);
        assert_eq!(
            out,
            vec![DecodedPayload::Json {
                line_nr: 7,
                value: json!({"id": "x"})
            }]
        );
    }

    #[test]
    fn done_is_not_parsed() {
        let mut decoder = PayloadDecoder::new();
        let out = decode(&mut decoder, "[DONE]");
        assert_eq!(out, vec![DecodedPayload::Done { line_nr: 7 }]);
        assert_eq!(decoder.dropped(), 0);
    }

    #[test]
    fn noise_is_dropped_silently() {
        let mut decoder = PayloadDecoder::new();
        assert!(decode(&mut decoder, "keep-alive").is_empty());
        assert!(decode(&mut decoder, r#"{"truncated":"#).is_empty());
        assert!(decode(&mut decoder, "").is_empty());
        assert_eq!(decoder.dropped(), 3);
    }
}
