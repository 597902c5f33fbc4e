//! Marionette Engine
//!
//! This crate provides the per-connection machinery behind the capability
//! surface:
//! - Handle table and id allocation
//! - Callback registry for async result delivery
//! - Channel adapter with outbound queueing
//! - Session wiring and the host-side embedding interface

mod callbacks;
mod channel;
mod session;
mod table;

pub use callbacks::*;
pub use channel::*;
pub use session::*;
pub use table::*;
