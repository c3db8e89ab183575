//! Built-in handlers registered on every pipeline.

use std::collections::HashSet;

use sluice_core::config::StreamConfig;
use sluice_core::types::DomainEvent;
use sluice_hooks::{EventBus, Interest, StreamHandler};
use tracing::warn;

use crate::codeblock::CodeBlockSegmenter;
use crate::tool_call::ToolCallAccumulator;

pub const CODE_BLOCK_HANDLER: &str = "code_block";
pub const TOOL_CALL_HANDLER: &str = "tool_call";
pub const IMAGE_HANDLER: &str = "image";

/// Runs text deltas through the fence segmenter and publishes its events.
#[derive(Default)]
pub struct CodeBlockHandler {
    segmenter: CodeBlockSegmenter,
}

impl CodeBlockHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamHandler for CodeBlockHandler {
    fn name(&self) -> &str {
        CODE_BLOCK_HANDLER
    }

    fn validate(&self, event: &DomainEvent) -> Interest {
        match event {
            DomainEvent::Delta { .. } | DomainEvent::StreamEnd => Interest::Claim,
            _ => Interest::Ignore,
        }
    }

    fn handle(&mut self, event: &DomainEvent, bus: &mut EventBus) {
        let mut publish = |ev| bus.emit(DomainEvent::CodeBlock(ev));
        match event {
            DomainEvent::Delta { content, .. } => self.segmenter.push(content, &mut publish),
            DomainEvent::StreamEnd => self.segmenter.finish(&mut publish),
            _ => {}
        }
    }
}

/// Accumulates tool-call arguments and publishes each finished call.
pub struct ToolCallHandler {
    accumulator: ToolCallAccumulator,
}

impl ToolCallHandler {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            accumulator: ToolCallAccumulator::with_limits(
                config.max_tool_call_bytes,
                config.repair_tool_arguments,
            ),
        }
    }
}

impl StreamHandler for ToolCallHandler {
    fn name(&self) -> &str {
        TOOL_CALL_HANDLER
    }

    fn validate(&self, event: &DomainEvent) -> Interest {
        match event {
            DomainEvent::ToolCallStart { .. }
            | DomainEvent::ToolCallArguments { .. }
            | DomainEvent::ToolCallComplete { .. } => Interest::Claim,
            _ => Interest::Ignore,
        }
    }

    fn handle(&mut self, event: &DomainEvent, bus: &mut EventBus) {
        match event {
            DomainEvent::ToolCallStart { call_id, name } => {
                self.accumulator.start(call_id, name.as_deref())
            }
            DomainEvent::ToolCallArguments { call_id, fragment } => {
                self.accumulator.append(call_id, fragment)
            }
            DomainEvent::ToolCallComplete { call_id } => {
                if let Some(call) = self.accumulator.complete(call_id) {
                    bus.emit(DomainEvent::ToolCallReady(call));
                }
            }
            _ => {}
        }
    }
}

/// Forwards usable image pointers, once per index when deduplicating.
pub struct ImageHandler {
    dedupe: bool,
    seen: HashSet<usize>,
}

impl ImageHandler {
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            dedupe: config.dedupe_images,
            seen: HashSet::new(),
        }
    }
}

impl StreamHandler for ImageHandler {
    fn name(&self) -> &str {
        IMAGE_HANDLER
    }

    fn validate(&self, event: &DomainEvent) -> Interest {
        match event {
            DomainEvent::Image(_) => Interest::Claim,
            _ => Interest::Ignore,
        }
    }

    fn handle(&mut self, event: &DomainEvent, bus: &mut EventBus) {
        let DomainEvent::Image(image) = event else {
            return;
        };
        if image.is_empty() {
            warn!(index = image.index, "image without payload or url dropped");
            return;
        }
        if self.dedupe && !self.seen.insert(image.index) {
            return;
        }
        bus.emit(DomainEvent::ImageReady(image.clone()));
    }
}
