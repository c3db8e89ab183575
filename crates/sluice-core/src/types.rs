use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifies one logical stream (UUIDv7, time-sortable for easier log correlation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl StreamId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Response metadata carried by the first chunk of a completion stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMeta {
    pub id: Option<String>,
    pub provider: Option<String>,
    pub model: Option<String>,
    /// Unix seconds.
    pub created: Option<i64>,
    pub fingerprint: Option<String>,
}

impl StreamMeta {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created.and_then(|secs| DateTime::from_timestamp(secs, 0))
    }
}

/// Token accounting from the terminal chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default, deserialize_with = "null_as_zero")]
    pub prompt_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub completion_tokens: u64,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub total_tokens: u64,
    /// Reported by some routers (e.g. OpenRouter), in credits.
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Some providers send `null` for counters they do not track.
fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or_default())
}

/// Where a generated image can be found. At least one of `b64` / `url` is set
/// for a usable pointer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePointer {
    pub index: usize,
    pub b64: Option<String>,
    pub url: Option<String>,
    /// MIME type taken from a `data:` URL, when the provider sent one.
    pub mime: Option<String>,
}

impl ImagePointer {
    pub fn is_empty(&self) -> bool {
        self.b64.is_none() && self.url.is_none()
    }
}

/// Output of the fenced-code segmenter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum CodeBlockEvent {
    TextFragment { text: String },
    CodeStart { language: Option<String> },
    CodeFragment { text: String },
    CodeEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Markdown,
    Code,
}

/// A contiguous, typed span of reconstructed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "type")]
    pub kind: SegmentKind,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Segment {
    pub fn markdown(content: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Markdown,
            content: content.into(),
            language: None,
        }
    }

    pub fn code(content: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Code,
            content: content.into(),
            language: None,
        }
    }
}

/// A tool call whose argument fragments have all arrived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedToolCall {
    pub call_id: String,
    pub name: Option<String>,
    /// Argument text: the repaired JSON when repair succeeded, else the raw concatenation.
    pub arguments: String,
    /// Parsed arguments, absent when even the repaired text is not valid JSON.
    pub parsed: Option<serde_json::Value>,
    /// True when the raw text did not parse and the repair pass changed it.
    pub repaired: bool,
}

/// Normalized, provider-agnostic stream events.
///
/// The first group is produced by the normalizer from provider JSON; the
/// second group is derived by handlers on the event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum DomainEvent {
    Meta(StreamMeta),
    Delta { seq: u64, content: String },
    Usage(Usage),
    Done { finish_reason: String },
    StreamEnd,
    Image(ImagePointer),
    ToolCallStart { call_id: String, name: Option<String> },
    ToolCallArguments { call_id: String, fragment: String },
    ToolCallComplete { call_id: String },

    /// Segmenter output, published by the code-block handler.
    CodeBlock(CodeBlockEvent),
    /// Accumulated and repaired tool call, published by the tool-call handler.
    ToolCallReady(CompletedToolCall),
    /// Image forwarded once per index, published by the image handler.
    ImageReady(ImagePointer),
}

impl DomainEvent {
    /// Short name used in log records.
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::Meta(_) => "meta",
            DomainEvent::Delta { .. } => "delta",
            DomainEvent::Usage(_) => "usage",
            DomainEvent::Done { .. } => "done",
            DomainEvent::StreamEnd => "stream_end",
            DomainEvent::Image(_) => "image",
            DomainEvent::ToolCallStart { .. } => "tool_call_start",
            DomainEvent::ToolCallArguments { .. } => "tool_call_arguments",
            DomainEvent::ToolCallComplete { .. } => "tool_call_complete",
            DomainEvent::CodeBlock(_) => "code_block",
            DomainEvent::ToolCallReady(_) => "tool_call_ready",
            DomainEvent::ImageReady(_) => "image_ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_ids_are_unique() {
        assert_ne!(StreamId::new(), StreamId::new());
        assert_eq!(StreamId::from("s-1").to_string(), "s-1");
    }

    #[test]
    fn created_at_converts_unix_seconds() {
        let meta = StreamMeta {
            created: Some(1_700_000_000),
            ..Default::default()
        };
        let ts = meta.created_at().unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert!(StreamMeta::default().created_at().is_none());
    }

    #[test]
    fn segment_serializes_with_type_tag() {
        let json = serde_json::to_value(Segment::code("let x = 1;\n")).unwrap();
        assert_eq!(json["type"], "code");
        assert_eq!(json["content"], "let x = 1;\n");
        assert!(json.get("language").is_none());
    }

    #[test]
    fn usage_tolerates_missing_fields() {
        let usage: Usage = serde_json::from_str(r#"{"prompt_tokens":3}"#).unwrap();
        assert_eq!(usage.prompt_tokens, 3);
        assert_eq!(usage.total_tokens, 0);
        assert!(usage.cost.is_none());
    }

    #[test]
    fn usage_counters_tolerate_null() {
        let usage: Usage = serde_json::from_str(
            r#"{"prompt_tokens": 12, "completion_tokens": null, "total_tokens": null, "cost": null}"#,
        )
        .unwrap();
        assert_eq!(usage.prompt_tokens, 12);
        assert_eq!(usage.completion_tokens, 0);
        assert_eq!(usage.total_tokens, 0);
        assert!(usage.cost.is_none());
    }

    #[test]
    fn event_tag_uses_snake_case() {
        let json = serde_json::to_value(DomainEvent::ToolCallComplete {
            call_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(json["event"], "tool_call_complete");
        assert_eq!(DomainEvent::StreamEnd.name(), "stream_end");
    }
}
