//! Raw chunk framing.
//!
//! Transports split the body at arbitrary points, mid-line or mid-brace
//! included. The framer turns each chunk into fragments aligned to
//! either line ends (EOL mode) or top-level brace blocks (bracket mode).
//! Fragments are emitted as soon as they are seen; nothing is held back.

use serde::Serialize;
use sluice_core::config::FramingMode;
use tracing::{trace, warn};

/// One piece of a line. A full line is the concatenation of its fragments in
/// `seq` order; the fragment with `line_complete` carries the trailing `\n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFragment {
    pub line_nr: usize,
    pub seq: usize,
    pub text: String,
    pub line_complete: bool,
}

/// Position of a content slice inside a bracket block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockPosition {
    First,
    Middle,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "frame")]
pub enum FrameEvent {
    Line(LineFragment),
    BracketOpen {
        block: usize,
    },
    BracketContent {
        block: usize,
        seq: usize,
        position: BlockPosition,
        content: String,
    },
    BracketClose {
        block: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    WaitingForEol,
    WaitForOpeningBrace,
    WaitingForClosingBrace { depth: usize },
}

pub struct LineFramer {
    state: FramerState,
    line_nr: usize,
    /// Next fragment seq within the current line, or content seq within the current block.
    seq: usize,
    block: usize,
    /// A backslash ended the previous chunk; the next char is escaped.
    escaped: bool,
}

impl LineFramer {
    pub fn new(mode: FramingMode) -> Self {
        let state = match mode {
            FramingMode::Eol => FramerState::WaitingForEol,
            FramingMode::Bracket => FramerState::WaitForOpeningBrace,
        };
        Self {
            state,
            line_nr: 0,
            seq: 0,
            block: 0,
            escaped: false,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Number of completed lines (EOL mode) or closed blocks (bracket mode).
    pub fn completed(&self) -> usize {
        match self.state {
            FramerState::WaitingForEol => self.line_nr,
            _ => self.block,
        }
    }

    /// Frame one chunk, emitting every boundary crossing it contains in order.
    pub fn process_chunk(&mut self, chunk: &str, emit: &mut impl FnMut(FrameEvent)) {
        if chunk.is_empty() {
            return;
        }
        match self.state {
            FramerState::WaitingForEol => self.frame_lines(chunk, emit),
            _ => self.frame_brackets(chunk, emit),
        }
    }

    /// Convenience wrapper collecting the events of one chunk.
    pub fn collect_chunk(&mut self, chunk: &str) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        self.process_chunk(chunk, &mut |ev| events.push(ev));
        events
    }

    /// Close a trailing line that never received its newline.
    ///
    /// Emits an empty `line_complete` fragment when a line is open, so readers
    /// that only act on complete lines still see it. Open bracket blocks are
    /// left as they are; there is no close marker to synthesize content for.
    pub fn finish(&mut self, emit: &mut impl FnMut(FrameEvent)) {
        if self.state == FramerState::WaitingForEol && self.seq > 0 {
            emit(FrameEvent::Line(LineFragment {
                line_nr: self.line_nr,
                seq: self.seq,
                text: String::new(),
                line_complete: true,
            }));
            self.line_nr += 1;
            self.seq = 0;
        }
    }

    fn frame_lines(&mut self, chunk: &str, emit: &mut impl FnMut(FrameEvent)) {
        let mut rest = chunk;
        while !rest.is_empty() {
            let (text, complete) = match rest.find('\n') {
                Some(pos) => (&rest[..=pos], true),
                None => (rest, false),
            };
            rest = &rest[text.len()..];

            trace!(line_nr = self.line_nr, seq = self.seq, len = text.len(), "line fragment");
            emit(FrameEvent::Line(LineFragment {
                line_nr: self.line_nr,
                seq: self.seq,
                text: text.to_string(),
                line_complete: complete,
            }));

            if complete {
                self.line_nr += 1;
                self.seq = 0;
            } else {
                self.seq += 1;
            }
        }
    }

    fn frame_brackets(&mut self, chunk: &str, emit: &mut impl FnMut(FrameEvent)) {
        // Byte offset where the current content slice starts (only meaningful inside a block).
        let mut slice_start = 0;

        for (pos, ch) in chunk.char_indices() {
            if self.escaped {
                self.escaped = false;
                continue;
            }
            match (ch, self.state) {
                ('\\', _) => self.escaped = true,
                ('{', FramerState::WaitForOpeningBrace) => {
                    self.state = FramerState::WaitingForClosingBrace { depth: 1 };
                    self.seq = 0;
                    emit(FrameEvent::BracketOpen { block: self.block });
                    slice_start = pos + 1;
                }
                ('{', FramerState::WaitingForClosingBrace { depth }) => {
                    self.emit_content(&chunk[slice_start..pos], false, emit);
                    self.state = FramerState::WaitingForClosingBrace { depth: depth + 1 };
                    slice_start = pos + 1;
                }
                ('}', FramerState::WaitForOpeningBrace) => {
                    warn!(block = self.block, "closing brace without open block ignored");
                }
                ('}', FramerState::WaitingForClosingBrace { depth: 1 }) => {
                    self.emit_content(&chunk[slice_start..pos], true, emit);
                    emit(FrameEvent::BracketClose { block: self.block });
                    self.block += 1;
                    self.state = FramerState::WaitForOpeningBrace;
                }
                ('}', FramerState::WaitingForClosingBrace { depth }) => {
                    self.emit_content(&chunk[slice_start..pos], false, emit);
                    self.state = FramerState::WaitingForClosingBrace { depth: depth - 1 };
                    slice_start = pos + 1;
                }
                _ => {}
            }
        }

        // Inside a block the tail of the chunk is a slice of its own, even when empty.
        if matches!(self.state, FramerState::WaitingForClosingBrace { .. }) {
            self.emit_content(&chunk[slice_start..], false, emit);
        }
    }

    /// Emit one content slice. The first slice of a block is tagged `First`;
    /// the slice that ends the block is `Last`. A block whose only slice ends
    /// it gets a `First` slice with the text followed by an empty `Last`.
    fn emit_content(
        &mut self,
        content: &str,
        closes_block: bool,
        emit: &mut impl FnMut(FrameEvent),
    ) {
        let block = self.block;
        if self.seq == 0 {
            emit(FrameEvent::BracketContent {
                block,
                seq: 0,
                position: BlockPosition::First,
                content: content.to_string(),
            });
            self.seq = 1;
            if closes_block {
                emit(FrameEvent::BracketContent {
                    block,
                    seq: 1,
                    position: BlockPosition::Last,
                    content: String::new(),
                });
                self.seq = 2;
            }
            return;
        }

        let position = if closes_block {
            BlockPosition::Last
        } else {
            BlockPosition::Middle
        };
        emit(FrameEvent::BracketContent {
            block,
            seq: self.seq,
            position,
            content: content.to_string(),
        });
        self.seq += 1;
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new(FramingMode::Eol)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
