//! Template lifecycle hooks.
//!
//! Observability without a specific metrics backend: a registrable list of
//! closures fired whenever the cache derives, reuses, or skips a Template.

use std::fmt;
use std::sync::Arc;

/// A lifecycle event raised by [`crate::template_cache::TemplateCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A new extended Template was derived for `old_id`, assigned `new_id`.
    Derived { old_id: u16, new_id: u16 },
    /// An already-cached extended Template was reused for `old_id`.
    Reused { old_id: u16, new_id: u16 },
    /// An Options Template was encountered and left untouched.
    SkippedOptions { old_id: u16 },
    /// A previously cached Template for `old_id` was invalidated because its
    /// definition changed, and will be re-derived.
    Invalidated { old_id: u16 },
}

/// A hook invoked for every [`Event`]. `Arc`-wrapped so it can be cloned and
/// shared cheaply.
pub type EventHook = Arc<dyn Fn(&Event) + Send + Sync + 'static>;

/// An ordered collection of registered hooks.
#[derive(Clone, Default)]
pub struct EventHooks {
    hooks: Vec<EventHook>,
}

impl fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHooks")
            .field("count", &self.hooks.len())
            .finish()
    }
}

impl EventHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: EventHook) {
        self.hooks.push(hook);
    }

    pub fn trigger(&self, event: &Event) {
        for hook in &self.hooks {
            hook(event);
        }
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}
