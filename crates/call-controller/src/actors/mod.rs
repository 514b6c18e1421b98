//! Actor model implementation for the Call Controller.
//!
//! Two actor types:
//! - `CoordinatorActor` (singleton): owns the call table, busy index,
//!   and invitation queue; routes client commands to call actors
//! - `CallActor` (one per call): owns one call's state machine from
//!   `ringing` through `ended`
//!
//! Handles communicate with actors over bounded mpsc channels and
//! receive results through oneshot channels.

pub mod call;
pub mod coordinator;
pub mod messages;
pub mod metrics;

pub use call::{CallActor, CallActorHandle, CallSetup};
pub use coordinator::{CoordinatorActor, CoordinatorHandle};
pub use messages::{
    CallMessage, CallSnapshot, CoordinatorMessage, CoordinatorStatus, InitiateResult,
};
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
