//! Unified error type for the phase protocols.

use serde::{Deserialize, Serialize};
use tessera_fsm::FsmError;

/// Error returned by protocol operations and machine callbacks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ProtocolError {
    /// Malformed or out-of-range request
    #[error("Invalid: {message}")]
    Invalid {
        /// What was wrong with the input
        message: String,
    },

    /// Event not allowed from the current state
    #[error("Invalid transition: event `{event}` is not allowed from state `{state}`")]
    InvalidTransition {
        /// Current state name
        state: String,
        /// Rejected event name
        event: String,
    },

    /// Internal event received from outside
    #[error("Event `{event}` is internal")]
    InternalEventRejected {
        /// Rejected event name
        event: String,
    },

    /// Event name not part of any phase
    #[error("Unknown event: {name}")]
    UnknownEvent {
        /// Unrecognised name
        name: String,
    },

    /// Confirmation for a participant the quorum does not contain
    #[error("Quorum entry not found: {message}")]
    QuorumEntryNotFound {
        /// Which entry was looked up
        message: String,
    },

    /// Confirmation for an entry that is no longer awaiting one
    #[error("Stale confirmation: {message}")]
    StaleConfirmation {
        /// Entry and its current status
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying decoder message
        message: String,
    },

    /// Required data missing from the payload
    #[error("Not found: {message}")]
    NotFound {
        /// What was missing
        message: String,
    },

    /// State machine definition or engine failure
    #[error("Machine error: {message}")]
    Machine {
        /// Engine message
        message: String,
    },
}

impl ProtocolError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create an unknown event error
    pub fn unknown_event(name: impl Into<String>) -> Self {
        Self::UnknownEvent { name: name.into() }
    }

    /// Create a missing quorum entry error
    pub fn quorum_entry_not_found(message: impl Into<String>) -> Self {
        Self::QuorumEntryNotFound {
            message: message.into(),
        }
    }

    /// Create a stale confirmation error
    pub fn stale_confirmation(message: impl Into<String>) -> Self {
        Self::StaleConfirmation {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a machine error
    pub fn machine(message: impl Into<String>) -> Self {
        Self::Machine {
            message: message.into(),
        }
    }

    /// True if the error is an `InvalidTransition`
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

impl From<FsmError> for ProtocolError {
    fn from(err: FsmError) -> Self {
        match err {
            FsmError::InvalidTransition { state, event } => Self::InvalidTransition { state, event },
            FsmError::InternalEventRejected { event } => Self::InternalEventRejected { event },
            other => Self::machine(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Standard Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
