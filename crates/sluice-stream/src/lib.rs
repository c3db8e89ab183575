//! Incremental parsing of chat-completion SSE streams.
//!
//! Each stage is usable on its own; [`StreamPipeline`] wires them together.

pub mod codeblock;
pub mod framer;
pub mod handlers;
pub mod normalize;
pub mod payload;
pub mod pipeline;
pub mod repair;
pub mod segments;
pub mod sse;
pub mod tool_call;

pub use codeblock::CodeBlockSegmenter;
pub use framer::{BlockPosition, FrameEvent, FramerState, LineFragment, LineFramer};
pub use handlers::{CodeBlockHandler, ImageHandler, ToolCallHandler};
pub use normalize::DomainEventNormalizer;
pub use payload::{DecodedPayload, PayloadDecoder};
pub use pipeline::StreamPipeline;
pub use segments::SegmentAccumulator;
pub use sse::{EventLineExtractor, SsePayload, DONE_SENTINEL};
pub use tool_call::ToolCallAccumulator;
