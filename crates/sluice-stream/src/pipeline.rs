//! The composed streaming pipeline.
//!
//! raw chunk → LineFramer → EventLineExtractor → PayloadDecoder →
//! DomainEventNormalizer → handler chain → listeners + SegmentAccumulator
//!
//! Every stage is a direct synchronous call on the caller's stack; nothing is
//! spawned, queued across calls, or retried. One pipeline serves exactly one
//! stream: feed its chunks in order, then call [`StreamPipeline::finalize`]
//! when the transport closes. Without `finalize`, held-back text (an
//! unterminated last line, an open fence) is discarded.

use sluice_core::config::{FramingMode, StreamConfig};
use sluice_core::types::{DomainEvent, Segment, StreamId};
use sluice_hooks::{HandlerChain, HookError, Listeners, StreamHandler};
use tracing::{debug, warn};

use crate::framer::{FrameEvent, LineFramer};
use crate::handlers::{CodeBlockHandler, ImageHandler, ToolCallHandler};
use crate::normalize::DomainEventNormalizer;
use crate::payload::{DecodedPayload, PayloadDecoder};
use crate::segments::SegmentAccumulator;
use crate::sse::EventLineExtractor;

pub struct StreamPipeline {
    id: StreamId,
    framer: LineFramer,
    extractor: EventLineExtractor,
    decoder: PayloadDecoder,
    normalizer: DomainEventNormalizer,
    fanout: Fanout,
    finalized: bool,
}

/// Everything downstream of the normalizer.
struct Fanout {
    chain: HandlerChain,
    listeners: Listeners<DomainEvent>,
    segments: SegmentAccumulator,
    transport_done: bool,
}

impl Fanout {
    fn dispatch(&mut self, event: DomainEvent) {
        let Fanout {
            chain,
            listeners,
            segments,
            ..
        } = self;
        chain.publish(event, &mut |ev| {
            if let DomainEvent::CodeBlock(cb) = ev {
                segments.apply(cb);
            }
            listeners.emit(ev);
        });
    }
}

impl StreamPipeline {
    /// Pipeline with the built-in code-block, tool-call and image handlers.
    pub fn new(config: &StreamConfig) -> Self {
        let mut pipeline = Self::bare();
        // Names are fixed and distinct; registration on an empty chain cannot collide.
        let builtins: [Box<dyn StreamHandler>; 3] = [
            Box::new(ToolCallHandler::new(config)),
            Box::new(ImageHandler::new(config)),
            Box::new(CodeBlockHandler::new()),
        ];
        for handler in builtins {
            if let Err(e) = pipeline.fanout.chain.register(handler) {
                warn!(error = %e, "built-in handler not registered");
            }
        }
        pipeline
    }

    /// Pipeline with no handlers registered. Segments stay empty unless a
    /// code-block handler is added.
    pub fn bare() -> Self {
        let id = StreamId::new();
        debug!(stream_id = %id, "stream pipeline created");
        Self {
            id,
            framer: LineFramer::new(FramingMode::Eol),
            extractor: EventLineExtractor::new(),
            decoder: PayloadDecoder::new(),
            normalizer: DomainEventNormalizer::new(),
            fanout: Fanout {
                chain: HandlerChain::new(),
                listeners: Listeners::new(),
                segments: SegmentAccumulator::new(),
                transport_done: false,
            },
            finalized: false,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    /// Append a handler to the chain; it sees events after the built-ins.
    pub fn register(&mut self, handler: Box<dyn StreamHandler>) -> Result<(), HookError> {
        self.fanout.chain.register(handler)
    }

    pub fn unregister(&mut self, name: &str) -> Result<(), HookError> {
        self.fanout.chain.unregister(name)
    }

    /// Receive every domain event, handler-derived ones included, in bus order.
    pub fn subscribe(&mut self, listener: impl FnMut(&DomainEvent) + 'static) {
        self.fanout.listeners.subscribe(listener);
    }

    /// Feed one transport chunk. Chunks after `finalize` are ignored.
    pub fn process_chunk(&mut self, chunk: &str) {
        if self.finalized {
            warn!(stream_id = %self.id, len = chunk.len(), "chunk after finalize ignored");
            return;
        }

        let Self {
            framer,
            extractor,
            decoder,
            normalizer,
            fanout,
            ..
        } = self;
        framer.process_chunk(chunk, &mut |frame| {
            route_frame(frame, extractor, decoder, normalizer, fanout)
        });
    }

    /// Flush everything held back and raise `StreamEnd`. Runs once; later
    /// calls do nothing.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        let Self {
            id,
            framer,
            extractor,
            decoder,
            normalizer,
            fanout,
            ..
        } = self;
        framer.finish(&mut |frame| route_frame(frame, extractor, decoder, normalizer, fanout));
        normalizer.finish(&mut |event| fanout.dispatch(event));

        debug!(
            stream_id = %id,
            segments = fanout.segments.segments().len(),
            dropped = decoder.dropped(),
            "stream finalized"
        );
    }

    /// Current segments. Safe to read mid-stream; complete after `finalize`.
    pub fn segments(&self) -> &[Segment] {
        self.fanout.segments.segments()
    }

    /// True once the transport's `[DONE]` sentinel has been seen.
    pub fn transport_done(&self) -> bool {
        self.fanout.transport_done
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Payloads dropped as non-JSON noise.
    pub fn dropped_payloads(&self) -> usize {
        self.decoder.dropped()
    }
}

impl Default for StreamPipeline {
    fn default() -> Self {
        Self::new(&StreamConfig::default())
    }
}

fn route_frame(
    frame: FrameEvent,
    extractor: &mut EventLineExtractor,
    decoder: &mut PayloadDecoder,
    normalizer: &mut DomainEventNormalizer,
    fanout: &mut Fanout,
) {
    let FrameEvent::Line(fragment) = frame else {
        return;
    };
    extractor.push(fragment, &mut |payload| {
        decoder.decode(payload, &mut |decoded| match decoded {
            DecodedPayload::Done { line_nr } => {
                debug!(line_nr, "transport done sentinel");
                fanout.transport_done = true;
            }
            DecodedPayload::Json { value, .. } => {
                normalizer.normalize(value, &mut |event| fanout.dispatch(event))
            }
        })
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
