//! Tessera FSM: deterministic finite state machines for multi-party protocols.
//!
//! A machine is an immutable transition table ([`Fsm`]) with callbacks attached
//! to events. Callbacks receive the round payload and may redirect the
//! transition through an `out_event`; events marked *auto* fire on their own
//! right after the machine lands in their source state. Progress lives outside
//! the machine, in an [`FsmInstance`] or in whatever the caller persists.
//!
//! Every `do_event` call is atomic: callbacks work on a copy of the payload, and the copy
//! is committed only if the whole chain, auto events included, succeeds.

#![forbid(unsafe_code)]

mod error;
pub mod fsm;
pub mod instance;

pub use error::FsmError;
pub use fsm::{Callback, EventDesc, Fired, Fsm, FsmTypes, Origin, Outcome};
pub use instance::{FsmInstance, FsmResponse, MachineResolver};
