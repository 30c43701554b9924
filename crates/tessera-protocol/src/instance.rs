//! Per-round protocol instances and their persisted form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tessera_fsm::{FsmInstance, FsmResponse};
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::machines::Protocol;
use crate::payload::MachineStatePayload;
use crate::registry::ProtocolRegistry;
use crate::requests::Request;
use crate::responses::Response;
use crate::states::{Event, State};
use crate::types::Message;

/// Persisted snapshot of a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsmDump {
    /// Round id
    pub dkg_round_id: String,
    /// Current state
    pub state: State,
    /// Round payload
    pub payload: MachineStatePayload,
}

impl FsmDump {
    /// Encode as JSON
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from JSON
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Result of one `do_event` call
pub type ProtocolResponse = FsmResponse<State, Response>;

/// Live machine for one round
pub struct ProtocolInstance {
    dkg_round_id: String,
    inner: FsmInstance<Protocol, Arc<ProtocolRegistry>>,
}

impl ProtocolInstance {
    /// Fresh round in the entry machine's initial state
    pub fn new(registry: Arc<ProtocolRegistry>, dkg_round_id: impl Into<String>) -> Result<Self> {
        let dkg_round_id = dkg_round_id.into();
        let state = registry.initial_state()?;
        let payload = MachineStatePayload::new(dkg_round_id.clone());
        Ok(Self {
            dkg_round_id,
            inner: FsmInstance::new(registry, state, payload),
        })
    }

    /// Rebuild a round from its dump
    pub fn from_dump(registry: Arc<ProtocolRegistry>, dump: FsmDump) -> Result<Self> {
        if dump.payload.dkg_round_id != dump.dkg_round_id {
            return Err(ProtocolError::invalid(format!(
                "dump for round `{}` carries payload of round `{}`",
                dump.dkg_round_id, dump.payload.dkg_round_id
            )));
        }
        Ok(Self {
            dkg_round_id: dump.dkg_round_id,
            inner: FsmInstance::new(registry, dump.state, dump.payload),
        })
    }

    /// Snapshot for the state store
    pub fn dump(&self) -> FsmDump {
        FsmDump {
            dkg_round_id: self.dkg_round_id.clone(),
            state: self.inner.current_state(),
            payload: self.inner.payload(),
        }
    }

    /// Round id
    pub fn dkg_round_id(&self) -> &str {
        &self.dkg_round_id
    }

    /// Current state
    pub fn current_state(&self) -> State {
        self.inner.current_state()
    }

    /// Snapshot of the payload
    pub fn payload(&self) -> MachineStatePayload {
        self.inner.payload()
    }

    /// Apply an external event
    pub fn do_event(&self, event: Event, request: &Request) -> Result<ProtocolResponse> {
        let response = self.inner.do_event(event, Some(request))?;
        debug!(
            round = %self.dkg_round_id,
            %event,
            state = %response.state,
            "protocol event applied"
        );
        Ok(response)
    }

    /// Decode and apply a transport message
    pub fn process_message(&self, message: &Message) -> Result<ProtocolResponse> {
        if message.dkg_round_id != self.dkg_round_id {
            return Err(ProtocolError::invalid(format!(
                "message for round `{}` sent to round `{}`",
                message.dkg_round_id, self.dkg_round_id
            )));
        }
        let event: Event = message.event.parse()?;
        let request = Request::decode(event, &message.data)?;
        self.do_event(event, &request)
    }
}
