//! Callback registry for asynchronous result delivery
//!
//! Local code registers a continuation against an id; a later, distinct
//! inbound message resolves it via the `rp` capability. Entries never
//! expire on their own — an unresolved callback stays pending for the
//! session's lifetime, which is an accepted leak, not a defect.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use marionette_protocol::{HandleId, Value};

/// A one-shot continuation invoked with the reported value.
pub type Continuation = Box<dyn FnOnce(Value) + Send>;

/// Maps ids to locally-registered continuations.
#[derive(Default)]
pub struct CallbackRegistry {
    entries: HashMap<HandleId, Continuation>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Register a continuation for `id`, overwriting any existing one.
    pub fn register(&mut self, id: HandleId, continuation: Continuation) {
        self.entries.insert(id, continuation);
    }

    /// Invoke and consume the continuation for `id`, exactly once.
    ///
    /// Returns whether a continuation was registered; resolving an
    /// unregistered id is a silent no-op. A panicking continuation is
    /// contained and logged so it cannot corrupt the session or the
    /// channel.
    pub fn resolve(&mut self, id: HandleId, value: Value) -> bool {
        let Some(continuation) = self.entries.remove(&id) else {
            tracing::trace!(id = %id, "resolve for unregistered callback ignored");
            return false;
        };
        if catch_unwind(AssertUnwindSafe(move || continuation(value))).is_err() {
            tracing::warn!(id = %id, "callback continuation panicked");
        }
        true
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn resolves_exactly_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = CallbackRegistry::new();

        let counter = calls.clone();
        registry.register(
            HandleId(1),
            Box::new(move |value| {
                assert_eq!(value, Value::Int(42));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.resolve(HandleId(1), Value::Int(42)));
        // Consumed: a second resolve is a silent no-op.
        assert!(!registry.resolve(HandleId(1), Value::Int(43)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_overwrites() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = CallbackRegistry::new();

        let counter = calls.clone();
        registry.register(HandleId(1), Box::new(move |_| {
            counter.fetch_add(10, Ordering::SeqCst);
        }));
        let counter = calls.clone();
        registry.register(HandleId(1), Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        registry.resolve(HandleId(1), Value::Null);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregistered_resolution_is_a_noop() {
        let mut registry = CallbackRegistry::new();
        assert!(!registry.resolve(HandleId(9), Value::Null));
    }

    #[test]
    fn panicking_continuations_are_contained() {
        let mut registry = CallbackRegistry::new();
        registry.register(HandleId(1), Box::new(|_| panic!("user code")));
        assert!(registry.resolve(HandleId(1), Value::Null));
        assert!(registry.is_empty());
    }
}
