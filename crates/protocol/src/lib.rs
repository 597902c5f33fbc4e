//! Marionette Protocol
//!
//! Defines the types both peers must agree on: handle ids, the value model,
//! and the outbound report framing. This crate is the source of truth for
//! the wire format.

mod ids;
mod value;
mod wire;

pub use ids::*;
pub use value::*;
pub use wire::*;
