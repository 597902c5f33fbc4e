//! Handle identifiers

use serde::{Deserialize, Serialize};

/// Reference to a value stored in a session's handle table.
///
/// Ids are meaningful only within one session. Locally-allocated ids count
/// down from [`HandleId::FIRST_LOCAL`]; ids chosen by the remote peer are
/// small ascending integers embedded in script text, so the two namespaces
/// never collide in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HandleId(pub i64);

impl HandleId {
    /// First id handed out by a fresh local allocator.
    pub const FIRST_LOCAL: HandleId = HandleId(i64::MAX);
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for HandleId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}
