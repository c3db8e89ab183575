//! Fenced code block detection over streamed text deltas.
//!
//! Deltas arrive at arbitrary boundaries, so a fence marker can straddle
//! several of them. Text is forwarded as soon as the current line can no
//! longer be a fence; only a line that still looks like a possible fence is
//! held back until its newline arrives.

use sluice_core::types::CodeBlockEvent;
use tracing::debug;

const FENCE_MIN: usize = 3;
/// Spaces allowed before a fence marker; four or more make an indented line.
const FENCE_MAX_INDENT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FenceState {
    Outside,
    Inside {
        /// Backtick count of the opening fence; the close needs at least as many.
        fence_len: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunKind {
    Text,
    Code,
}

/// Coalesces adjacent content of one kind into a single event.
struct Run {
    kind: RunKind,
    buf: String,
}

impl Run {
    fn new() -> Self {
        Self {
            kind: RunKind::Text,
            buf: String::new(),
        }
    }

    fn push(&mut self, kind: RunKind, text: &str, emit: &mut impl FnMut(CodeBlockEvent)) {
        if kind != self.kind {
            self.flush(emit);
            self.kind = kind;
        }
        self.buf.push_str(text);
    }

    fn flush(&mut self, emit: &mut impl FnMut(CodeBlockEvent)) {
        if self.buf.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.buf);
        emit(match self.kind {
            RunKind::Text => CodeBlockEvent::TextFragment { text },
            RunKind::Code => CodeBlockEvent::CodeFragment { text },
        });
    }
}

pub struct CodeBlockSegmenter {
    state: FenceState,
    /// Start of the current line while it could still be a fence marker.
    pending: String,
    /// The current line is known not to be a fence; forward the rest of it.
    line_committed: bool,
}

impl CodeBlockSegmenter {
    pub fn new() -> Self {
        Self {
            state: FenceState::Outside,
            pending: String::new(),
            line_committed: false,
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self.state, FenceState::Inside { .. })
    }

    /// Feed one text delta.
    pub fn push(&mut self, delta: &str, emit: &mut impl FnMut(CodeBlockEvent)) {
        let mut run = Run::new();
        let mut rest = delta;

        while !rest.is_empty() {
            let (piece, has_newline) = match rest.find('\n') {
                Some(pos) => (&rest[..=pos], true),
                None => (rest, false),
            };
            rest = &rest[piece.len()..];

            if self.line_committed {
                run.push(self.content_kind(), piece, emit);
                if has_newline {
                    self.line_committed = false;
                }
                continue;
            }

            self.pending.push_str(piece);
            if has_newline {
                let line = std::mem::take(&mut self.pending);
                self.complete_line(&line, &mut run, emit);
            } else if !self.could_be_fence(&self.pending) {
                let text = std::mem::take(&mut self.pending);
                run.push(self.content_kind(), &text, emit);
                self.line_committed = true;
            }
        }

        run.flush(emit);
    }

    /// End of stream. Closes an open block and flushes trailing text.
    ///
    /// Held-back text that parses as a fence marker is structural and is
    /// dropped; inside a block, an unresolved partial fence (held-back text
    /// with a backtick) is dropped too. Held-back whitespace is content.
    pub fn finish(&mut self, emit: &mut impl FnMut(CodeBlockEvent)) {
        let pending = std::mem::take(&mut self.pending);
        self.line_committed = false;

        match self.state {
            FenceState::Outside => {
                if !pending.is_empty() && parse_open_fence(&pending).is_none() {
                    emit(CodeBlockEvent::TextFragment { text: pending });
                }
            }
            FenceState::Inside { .. } => {
                if pending.contains('`') {
                    debug!(len = pending.len(), "dangling fence text dropped at stream end");
                } else if !pending.is_empty() {
                    emit(CodeBlockEvent::CodeFragment { text: pending });
                }
                debug!("code block closed at stream end");
                emit(CodeBlockEvent::CodeEnd);
                self.state = FenceState::Outside;
            }
        }
    }

    fn content_kind(&self) -> RunKind {
        match self.state {
            FenceState::Outside => RunKind::Text,
            FenceState::Inside { .. } => RunKind::Code,
        }
    }

    fn could_be_fence(&self, partial: &str) -> bool {
        let Some(s) = strip_fence_indent(partial) else {
            return false;
        };
        match self.state {
            FenceState::Outside if s.len() < FENCE_MIN => s.chars().all(|c| c == '`'),
            FenceState::Outside => s.starts_with("```"),
            FenceState::Inside { .. } => {
                let rest = s.trim_start_matches('`');
                (rest.len() < s.len() || s.is_empty())
                    && rest.chars().all(|c| matches!(c, ' ' | '\t' | '\r'))
            }
        }
    }

    fn complete_line(&mut self, line: &str, run: &mut Run, emit: &mut impl FnMut(CodeBlockEvent)) {
        match self.state {
            FenceState::Outside => match parse_open_fence(line) {
                Some((fence_len, language)) => {
                    run.flush(emit);
                    debug!(language = ?language, "code block opened");
                    emit(CodeBlockEvent::CodeStart { language });
                    self.state = FenceState::Inside { fence_len };
                }
                None => run.push(RunKind::Text, line, emit),
            },
            FenceState::Inside { fence_len } => {
                if is_close_fence(line, fence_len) {
                    run.flush(emit);
                    debug!("code block closed");
                    emit(CodeBlockEvent::CodeEnd);
                    self.state = FenceState::Outside;
                } else {
                    run.push(RunKind::Code, line, emit);
                }
            }
        }
    }
}

impl Default for CodeBlockSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the backtick count and language tag if `line` opens a fence.
///
/// An info string containing a backtick is not a fence, which keeps inline
/// spans such as "```x```" in prose.
fn parse_open_fence(line: &str) -> Option<(usize, Option<String>)> {
    let s = strip_fence_indent(line.trim_end_matches(['\n', '\r']))?;
    let ticks = s.chars().take_while(|c| *c == '`').count();
    if ticks < FENCE_MIN {
        return None;
    }
    let info = s[ticks..].trim();
    if info.contains('`') {
        return None;
    }
    let language = info.split_whitespace().next().map(str::to_string);
    Some((ticks, language))
}

/// True if `line` consists only of at least `fence_len` backticks.
fn is_close_fence(line: &str, fence_len: usize) -> bool {
    let Some(s) = strip_fence_indent(line.trim_end()) else {
        return false;
    };
    let ticks = s.chars().take_while(|c| *c == '`').count();
    ticks >= fence_len && ticks == s.len()
}

/// The line without its leading spaces, or `None` when it is indented too
/// far to hold a fence.
fn strip_fence_indent(line: &str) -> Option<&str> {
    let s = line.trim_start_matches(' ');
    (line.len() - s.len() <= FENCE_MAX_INDENT).then_some(s)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
