//! Marionette Script Host
//!
//! Sandbox for running remote-authored scripts against a capability-limited
//! host API. Inbound message text is untrusted; it is parsed and evaluated
//! by an in-tree interpreter for a small, explicitly defined instruction
//! language, with exactly one bound name resolving to the capability
//! surface and no other ambient access.
//!
//! ## Script API
//!
//! With the default bound name `_w`, scripts have access to:
//!
//! - `_w.a(value)` - Allocate a handle for a value, returns its id
//! - `_w.g(id)` - Get the value behind a handle (raises if it is errored)
//! - `_w.s(id, value)` - Set a handle, clearing any errored tag
//! - `_w.d(id)` - Delete a handle
//! - `_w.r(id, value)` - Report a value to the remote peer, keyed by id
//! - `_w.rp(id, value)` - Resolve a locally-registered callback
//! - `_w.c(id)` - Check a handle; errored payloads move to a fresh slot
//! - `_w.e(id, value)` - Mark a handle as holding an error payload
//! - `_w.x` - The read-only extension bag
//!
//! Plus `let` bindings, literals (numbers, strings, arrays, objects), and
//! member/index access on values. Nothing else resolves.

mod interp;
mod lexer;
mod parser;

pub use interp::*;
pub use lexer::*;
pub use parser::*;

use marionette_protocol::{HandleId, Value};
use thiserror::Error;

/// Errors from script execution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("parse error at line {line}: {message}")]
    Parse { line: u32, message: String },

    #[error("script source exceeds {max} bytes")]
    SourceTooLarge { max: usize },

    #[error("nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    #[error("evaluation exceeded {max} steps")]
    StepBudgetExceeded { max: u64 },

    #[error("unknown name `{0}`")]
    UnknownName(String),

    #[error("type error: {0}")]
    Type(String),

    /// A stored error value resurfaced through `g`.
    #[error("script raised a stored error value")]
    Propagated(Value),

    #[error("host error: {0}")]
    Host(HostError),
}

/// Failures the host reports back into the script
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// The reported value could not be serialized for the wire.
    #[error("report could not be serialized: {0}")]
    Serialize(String),

    #[error("host fault: {0}")]
    Internal(String),
}

/// Configuration and sandbox limits for script execution
#[derive(Debug, Clone)]
pub struct ScriptConfig {
    /// Name under which the capability surface is visible to scripts
    pub bound_name: String,
    /// Maximum script source length in bytes
    pub max_source_len: usize,
    /// Maximum expression nesting depth
    pub max_depth: usize,
    /// Maximum evaluation steps per script
    pub max_steps: u64,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            bound_name: "_w".to_string(),
            max_source_len: 64 * 1024,
            max_depth: 64,
            max_steps: 100_000,
        }
    }
}

/// Request from script to host
#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    /// Store a value under a freshly allocated handle
    Allocate(Value),
    /// Read the value behind a handle
    Get(HandleId),
    /// Write a handle, clearing any errored tag
    Set(HandleId, Value),
    /// Delete a handle
    Delete(HandleId),
    /// Send a report frame to the remote peer
    Report(HandleId, Value),
    /// Resolve a locally-registered callback
    ResolveCallback(HandleId, Value),
    /// Inspect a handle, moving an errored payload to a fresh slot
    CheckAndMove(HandleId),
    /// Tag a handle as holding an error payload
    MarkErrored(HandleId, Value),
    /// Read the extension bag
    ExtensionBag,
}

/// Response from host to script
#[derive(Debug, Clone, PartialEq)]
pub enum HostResponse {
    /// A freshly allocated handle id
    Id(HandleId),
    /// A plain value
    Value(Value),
    /// The slot an errored payload was moved into
    Slot(HandleId),
    /// Operation succeeded with nothing to return
    Ok,
    /// A stored error value must resurface as a script failure
    Raise(Value),
    /// The operation itself failed
    Error(HostError),
}

/// The seam between the sandbox and the engine.
///
/// The session behind the capability surface implements this; the
/// interpreter calls it for every capability operation a script performs.
pub trait CapabilityHost {
    fn request(&mut self, request: HostRequest) -> HostResponse;
}
