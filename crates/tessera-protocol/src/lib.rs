//! Tessera protocol: the three chained phase machines.
//!
//! A round moves through a signature proposal (invitations), a DKG proposal
//! (commits, deals, responses, master key) and any number of signing
//! proposals. Each phase is a [`tessera_fsm::Fsm`] sharing one
//! [`MachineStatePayload`]; the [`ProtocolRegistry`] routes every event to the
//! machine owning the current state.
//!
//! The online node drives a round one message at a time:
//!
//! ```ignore
//! let round = ProtocolInstance::from_dump(registry.clone(), dump)?;
//! let response = round.process_message(&message)?;
//! store.put(round.dump().to_json()?);
//! if let Some(op) = build_operation(round.dkg_round_id(), response.state, response.response.as_ref())? {
//!     executor.handle_operation(op)?;
//! }
//! ```

#![forbid(unsafe_code)]

pub mod config;
mod error;
pub mod instance;
pub mod machines;
pub mod operations;
pub mod payload;
pub mod quorum;
pub mod registry;
pub mod requests;
pub mod responses;
pub mod serde;
pub mod states;
pub mod types;

pub use error::{ProtocolError, Result};
pub use instance::{FsmDump, ProtocolInstance, ProtocolResponse};
pub use machines::Protocol;
pub use operations::{build_operation, requires_operation};
pub use payload::{MachineStatePayload, ParticipantId};
pub use registry::{Phase, ProtocolRegistry};
pub use requests::Request;
pub use responses::Response;
pub use states::{DkgStage, Event, State};
pub use types::{Message, Operation};
