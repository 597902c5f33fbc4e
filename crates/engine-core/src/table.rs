//! Handle table and id allocation

use std::collections::HashMap;

use marionette_protocol::{HandleId, Value};
use thiserror::Error;

/// Raised when `get` reads a handle tagged as errored; carries the stored
/// payload as plain data.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("handle holds a stored error value")]
pub struct PropagatedError(pub Value);

/// One entry in the handle table
#[derive(Debug, Clone, PartialEq)]
pub struct Handle {
    pub value: Value,
    pub errored: bool,
}

/// Outcome of [`HandleTable::check_and_move`]
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// The handle was not errored; its value (or the absent sentinel).
    Value(Value),
    /// The handle was errored; the payload now also lives in this fresh,
    /// non-errored slot.
    Slot(HandleId),
}

/// Produces locally-unique handle ids.
///
/// Counts down from `i64::MAX` so locally-allocated ids stay disjoint from
/// the small ascending ids the remote peer embeds in script text.
#[derive(Debug)]
pub struct IdAllocator {
    next: i64,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: HandleId::FIRST_LOCAL.0,
        }
    }

    /// Returns the current counter value, then decrements it.
    pub fn next(&mut self) -> HandleId {
        let id = HandleId(self.next);
        self.next -= 1;
        id
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// The authoritative store of live local values, keyed by id.
///
/// Handles are created by allocation or by an explicit write to an unused
/// id, and destroyed only by explicit deletion. Nothing auto-collects
/// them; a misbehaving peer can leak by design.
#[derive(Debug, Default)]
pub struct HandleTable {
    entries: HashMap<HandleId, Handle>,
    allocator: IdAllocator,
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            allocator: IdAllocator::new(),
        }
    }

    /// Store `value` under a freshly allocated id. Never fails.
    pub fn allocate(&mut self, value: Value) -> HandleId {
        let id = self.allocator.next();
        self.entries.insert(
            id,
            Handle {
                value,
                errored: false,
            },
        );
        id
    }

    /// Look up a handle.
    ///
    /// Absent ids are `Ok(None)` — the explicit absent-value sentinel, not
    /// an error. An errored handle fails with the stored payload; this is
    /// how a tagged error resurfaces at read time.
    pub fn get(&self, id: HandleId) -> Result<Option<&Value>, PropagatedError> {
        match self.entries.get(&id) {
            None => Ok(None),
            Some(handle) if handle.errored => Err(PropagatedError(handle.value.clone())),
            Some(handle) => Ok(Some(&handle.value)),
        }
    }

    /// Unconditionally (re)write a handle, clearing any errored tag.
    pub fn set(&mut self, id: HandleId, value: Value) {
        self.entries.insert(
            id,
            Handle {
                value,
                errored: false,
            },
        );
    }

    /// Remove a handle; no-op when absent.
    pub fn remove(&mut self, id: HandleId) {
        self.entries.remove(&id);
    }

    /// Tag `id` as holding an error payload, without raising.
    pub fn mark_errored(&mut self, id: HandleId, value: Value) {
        self.entries.insert(
            id,
            Handle {
                value,
                errored: true,
            },
        );
    }

    /// Inspect a handle without ever raising.
    ///
    /// A non-errored handle yields its value (absent yields the sentinel).
    /// An errored handle has its payload copied into a freshly allocated
    /// non-errored slot, so the error can cross serialization boundaries
    /// as ordinary data; the source handle keeps its errored tag until
    /// explicitly deleted.
    pub fn check_and_move(&mut self, id: HandleId) -> CheckOutcome {
        match self.entries.get(&id) {
            None => CheckOutcome::Value(Value::Undefined),
            Some(handle) if !handle.errored => CheckOutcome::Value(handle.value.clone()),
            Some(handle) => {
                let payload = handle.value.clone();
                CheckOutcome::Slot(self.allocate(payload))
            }
        }
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
