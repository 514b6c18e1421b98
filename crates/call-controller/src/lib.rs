//! Call Controller (CC) Service Library
//!
//! This library provides the core functionality for the Switchboard
//! Call Controller - a stateful signaling coordinator responsible for:
//!
//! - Brokering call invitations between staff and client participants
//! - Relaying WebRTC session descriptions and ICE candidates
//! - Enforcing call lifecycle invariants (one active call per
//!   participant, bounded ringing, clean teardown on disconnect)
//! - Graceful shutdown with in-flight call draining
//!
//! # Architecture
//!
//! The CC uses a two-level actor hierarchy:
//!
//! ```text
//! CoordinatorActor (singleton per CC instance)
//! ├── owns the call table, busy index, and invitation queue
//! └── supervises N CallActors
//!     └── CallActor (one per call)
//!         ├── owns one call's state machine
//!         └── relays signaling payloads between the two participants
//! ```
//!
//! # Key Design Decisions
//!
//! - **One call per participant**: the coordinator's busy index rejects
//!   a second initiate while either party has a non-terminal call
//! - **Bounded ringing**: invitations carry a deadline; the call actor
//!   times itself out and notifies both sides
//! - **Control vs relay routing**: accept/decline/end are awaited by
//!   the coordinator so busy bookkeeping stays consistent; SDP and ICE
//!   relays are forwarded without waiting
//! - **Retention window**: terminal calls are kept briefly so late
//!   commands get a precise error instead of `CallNotFound`
//!
//! # Modules
//!
//! - [`actors`] - Coordinator and per-call actors
//! - [`config`] - Service configuration from environment
//! - [`errors`] - Error types with signaling error codes
//! - [`external`] - Call history and staff availability seams
//! - [`invitations`] - Pending invitation queue
//! - [`observability`] - Health endpoints
//! - [`registry`] - Connected participant registry
//! - [`sessions`] - Client/staff session store
//! - [`signaling`] - Wire frame routing onto the coordinator

pub mod actors;
pub mod config;
pub mod errors;
pub mod external;
pub mod invitations;
pub mod observability;
pub mod registry;
pub mod sessions;
pub mod signaling;
