//! The three phase machines.
//!
//! Each machine is a transition table plus free-function callbacks over
//! [`MachineStatePayload`]. They chain through shared states: the last state of
//! one phase is the initial state of the next.

use tessera_fsm::FsmTypes;

use crate::error::ProtocolError;
use crate::payload::MachineStatePayload;
use crate::requests::Request;
use crate::responses::Response;
use crate::states::{Event, State};

pub mod dkg_proposal;
pub mod signature_proposal;
pub mod signing_proposal;

/// Type family shared by every phase machine
#[derive(Debug)]
pub struct Protocol;

impl FsmTypes for Protocol {
    type State = State;
    type Event = Event;
    type Payload = MachineStatePayload;
    type Request = Request;
    type Response = Response;
    type Error = ProtocolError;
}

/// Phase machine definition
pub type Machine = tessera_fsm::Fsm<Protocol>;

/// Callback result
pub(crate) type Outcome = tessera_fsm::Outcome<Protocol>;

/// Callback signature
pub(crate) type Callback = tessera_fsm::Callback<Protocol>;
