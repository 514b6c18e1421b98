//! Signaling wire vocabulary for Switchboard.
//!
//! This crate defines the externally observed contract between the call
//! controller and its transport layer: the commands a client may send,
//! the events the core emits, and the shared call-state types. SDP and
//! ICE payloads are opaque JSON values, forwarded verbatim and never
//! inspected.

#![warn(clippy::pedantic)]

pub mod codec;
pub mod events;
pub mod types;

pub use codec::{decode_command, encode_event, CodecError};
pub use events::{ClientCommand, ServerEvent};
pub use types::{CallState, EndReason, Role};
