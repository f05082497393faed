//! Kennel ops: the click-to-remote pipeline behind the daily-care grid.
//!
//! A user click flows through [`CareSession::on_cell_click`]: the click
//! gate rate-limits duplicate taps (advisory only), the coordinator applies
//! the optimistic board update and queues the remote mutation, and the
//! operation queue drains one call at a time, reverting local state and
//! notifying on failure.

#![forbid(unsafe_code)]

mod care;
mod debounce;
mod dispatch;
mod gate;
mod queue;
mod session;

pub use debounce::Debouncer;
pub use gate::ClickGate;
pub use queue::{OpQueue, PendingOp, QueueConfig, SettleHook};
pub use session::{CareSession, SessionConfig};
