use serde::{Deserialize, Serialize};
use sluice_core::types::DomainEvent;

/// A handler's answer to `validate`: whether it wants to handle the event.
///
/// Ignoring an event never hides it from the handlers after this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interest {
    Claim,
    Ignore,
}

/// Collects events a handler publishes while handling another event.
#[derive(Debug, Default)]
pub struct EventBus {
    pending: Vec<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: DomainEvent) {
        self.pending.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn drain(&mut self) -> std::vec::Drain<'_, DomainEvent> {
        self.pending.drain(..)
    }
}

/// A pluggable stage observing the normalized event stream.
///
/// Handlers run synchronously on the caller's stack and must not block.
pub trait StreamHandler: Send {
    /// Unique name used for deregistration and log correlation.
    fn name(&self) -> &str;

    /// Classify interest in `event`. Only claimed events reach `handle`.
    fn validate(&self, event: &DomainEvent) -> Interest;

    /// React to a claimed event, optionally publishing derived events.
    fn handle(&mut self, event: &DomainEvent, bus: &mut EventBus);
}

/// Ordered list of plain event callbacks.
pub struct Listeners<E> {
    callbacks: Vec<Box<dyn FnMut(&E)>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&E) + 'static) {
        self.callbacks.push(Box::new(callback));
    }

    pub fn emit(&mut self, event: &E) {
        for callback in self.callbacks.iter_mut() {
            callback(event);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}
