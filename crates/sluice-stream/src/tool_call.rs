use std::collections::HashMap;

use sluice_core::config::DEFAULT_MAX_TOOL_CALL_BYTES;
use sluice_core::types::CompletedToolCall;
use tracing::{debug, warn};

use crate::repair::repair_json;

/// In-progress tool call.
#[derive(Debug, Default)]
struct ToolCallBuffer {
    name: Option<String>,
    /// Raw argument text; partial JSON until the call completes.
    arguments: String,
    truncated: bool,
}

/// Buffers streamed tool-call arguments per call id until each call completes.
///
/// Buffers are isolated per id. Each call is finalized at most once:
/// completing releases its buffer.
#[derive(Debug)]
pub struct ToolCallAccumulator {
    buffers: HashMap<String, ToolCallBuffer>,
    max_bytes: usize,
    repair: bool,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_TOOL_CALL_BYTES, true)
    }

    pub fn with_limits(max_bytes: usize, repair: bool) -> Self {
        Self {
            buffers: HashMap::new(),
            max_bytes,
            repair,
        }
    }

    pub fn start(&mut self, call_id: &str, name: Option<&str>) {
        let buffer = self.buffers.entry(call_id.to_string()).or_default();
        if buffer.name.is_none() {
            buffer.name = name.map(str::to_string);
        }
    }

    pub fn append(&mut self, call_id: &str, fragment: &str) {
        if !self.buffers.contains_key(call_id) {
            debug!(call_id, "arguments for unstarted tool call; opening buffer");
        }
        let buffer = self.buffers.entry(call_id.to_string()).or_default();

        if buffer.arguments.len() + fragment.len() > self.max_bytes {
            if !buffer.truncated {
                warn!(
                    call_id,
                    max = self.max_bytes,
                    "tool call arguments over limit; dropping rest"
                );
                buffer.truncated = true;
            }
            return;
        }
        buffer.arguments.push_str(fragment);
    }

    /// Finish a call and return its arguments, repaired when needed.
    ///
    /// Returns `None` if the call was never started or already completed.
    /// A call whose text cannot be repaired still completes with the raw text.
    pub fn complete(&mut self, call_id: &str) -> Option<CompletedToolCall> {
        let buffer = self.buffers.remove(call_id)?;
        let raw = buffer.arguments;

        let parsed = serde_json::from_str::<serde_json::Value>(&raw).ok();
        let (arguments, parsed, repaired) = match parsed {
            Some(value) => (raw, Some(value), false),
            None if self.repair => match repair_json(&raw) {
                Some((text, value)) => {
                    let changed = text != raw;
                    (text, Some(value), changed)
                }
                None => {
                    warn!(
                        call_id,
                        len = raw.len(),
                        "tool call arguments unrepairable; passing raw text"
                    );
                    (raw, None, false)
                }
            },
            None => (raw, None, false),
        };

        debug!(call_id, repaired, "tool call complete");
        Some(CompletedToolCall {
            call_id: call_id.to_string(),
            name: buffer.name,
            arguments,
            parsed,
            repaired,
        })
    }

    pub fn is_open(&self, call_id: &str) -> bool {
        self.buffers.contains_key(call_id)
    }

    pub fn open_calls(&self) -> usize {
        self.buffers.len()
    }
}

impl Default for ToolCallAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
