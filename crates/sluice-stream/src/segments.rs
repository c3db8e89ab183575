use sluice_core::types::{CodeBlockEvent, Segment, SegmentKind};
use tracing::debug;

/// Folds segmenter events into an ordered list of typed segments.
///
/// Only the last segment is ever extended; everything before it is frozen.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    segments: Vec<Segment>,
    code_open: bool,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &CodeBlockEvent) {
        match event {
            CodeBlockEvent::TextFragment { text } => {
                self.code_open = false;
                match self.segments.last_mut() {
                    Some(last) if last.kind == SegmentKind::Markdown => last.content.push_str(text),
                    _ => self.segments.push(Segment::markdown(text.as_str())),
                }
            }
            CodeBlockEvent::CodeStart { language } => {
                self.segments.push(Segment {
                    kind: SegmentKind::Code,
                    content: String::new(),
                    language: language.clone(),
                });
                self.code_open = true;
            }
            CodeBlockEvent::CodeFragment { text } => match self.segments.last_mut() {
                Some(last) if self.code_open => last.content.push_str(text),
                _ => {
                    debug!("code fragment without open block; starting a new code segment");
                    self.segments.push(Segment::code(text.as_str()));
                    self.code_open = true;
                }
            },
            CodeBlockEvent::CodeEnd => self.code_open = false,
        }
    }

    /// Segments so far. Complete only once the stream has been finalized.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Concatenated content of every segment, in order.
    pub fn text(&self) -> String {
        self.segments.iter().map(|s| s.content.as_str()).collect()
    }
}
