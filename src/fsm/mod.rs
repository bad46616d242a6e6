//! Review finite-state machine.
//!
//! The FSM is pure: [`ReviewFsm::process`] returns the outbox for a
//! transition as data and performs no I/O. The dispatcher in
//! [`crate::service`] applies the outbox.

mod event;
mod outbox;
mod state;
mod transition;

pub use event::ReviewEvent;
pub use outbox::{ActivityKind, OutboxEvent};
pub use state::ReviewState;
pub use transition::{ReviewEnv, ReviewFsm, TransitionError, transition};
