use std::collections::VecDeque;

use sluice_core::types::DomainEvent;
use tracing::{debug, trace};

use crate::error::{HookError, Result};
use crate::types::{EventBus, Interest, StreamHandler};

/// Registry and dispatcher for stream handlers.
///
/// One chain belongs to one stream; it is not shared between streams.
pub struct HandlerChain {
    /// Kept in registration order; dispatch follows this order.
    handlers: Vec<Box<dyn StreamHandler>>,
}

impl HandlerChain {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a handler at the end of the chain.
    pub fn register(&mut self, handler: Box<dyn StreamHandler>) -> Result<()> {
        if self.contains(handler.name()) {
            return Err(HookError::DuplicateHandler {
                name: handler.name().to_string(),
            });
        }
        debug!(name = handler.name(), "stream handler registered");
        self.handlers.push(handler);
        Ok(())
    }

    /// Remove a handler by name.
    pub fn unregister(&mut self, name: &str) -> Result<()> {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.name() != name);
        if self.handlers.len() == before {
            return Err(HookError::UnknownHandler {
                name: name.to_string(),
            });
        }
        debug!(name, "stream handler unregistered");
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.iter().any(|h| h.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Publish an event and run it, plus everything derived from it, to completion.
    ///
    /// `observe` sees each event once, before the handlers run on it. Derived
    /// events are queued FIFO, so they always follow the event that produced
    /// them and keep the order in which handlers emitted them.
    pub fn publish(&mut self, event: DomainEvent, observe: &mut dyn FnMut(&DomainEvent)) {
        let mut queue = VecDeque::from([event]);
        let mut bus = EventBus::new();

        while let Some(event) = queue.pop_front() {
            observe(&event);

            for handler in self.handlers.iter_mut() {
                if handler.validate(&event) == Interest::Ignore {
                    continue;
                }
                trace!(handler = handler.name(), event = event.name(), "handler claimed event");
                handler.handle(&event, &mut bus);
                queue.extend(bus.drain());
            }
        }
    }
}

impl Default for HandlerChain {
    fn default() -> Self {
        Self::new()
    }
}
