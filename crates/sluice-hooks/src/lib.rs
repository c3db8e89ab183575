//! Event bus for normalized stream events.
//!
//! Handlers are registered on a [`HandlerChain`] and see every event in
//! registration order. A handler that claims an event may publish further
//! events onto the same bus; those are delivered after the event that
//! produced them.

pub mod engine;
pub mod error;
pub mod types;

pub use engine::HandlerChain;
pub use error::HookError;
pub use types::{EventBus, Interest, Listeners, StreamHandler};
