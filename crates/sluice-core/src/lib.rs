//! Shared types, configuration and errors for the sluice streaming pipeline.

pub mod config;
pub mod error;
pub mod types;

pub use config::{FramingMode, ReplayConfig, SluiceConfig, StreamConfig};
pub use error::{Result, SluiceError};
pub use types::{
    CodeBlockEvent, CompletedToolCall, DomainEvent, ImagePointer, Segment, SegmentKind,
    StreamId, StreamMeta, Usage,
};
