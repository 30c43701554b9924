//! Transport and executor boundary records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::requests::Request;
use crate::serde::base64_bytes;
use crate::states::{Event, State};

/// Unit exchanged through the append-only transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id
    pub id: String,
    /// Round the message belongs to
    pub dkg_round_id: String,
    /// Position in the transport log, assigned by the transport
    #[serde(default)]
    pub offset: u64,
    /// Event name
    pub event: String,
    /// Encoded request
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
    /// Sender signature, filled by the online layer
    #[serde(with = "base64_bytes", default)]
    pub signature: Vec<u8>,
    /// Sender address
    pub sender_addr: String,
    /// Recipient address; empty for broadcast
    #[serde(default)]
    pub recipient_addr: String,
}

impl Message {
    /// Unsigned broadcast message carrying `request` for `event`
    pub fn new(
        dkg_round_id: impl Into<String>,
        event: Event,
        request: &Request,
        sender_addr: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            dkg_round_id: dkg_round_id.into(),
            offset: 0,
            event: event.to_string(),
            data: request.encode()?,
            signature: Vec::new(),
            sender_addr: sender_addr.into(),
            recipient_addr: String::new(),
        })
    }

    /// Address the message to a single participant
    pub fn with_recipient(mut self, recipient_addr: impl Into<String>) -> Self {
        self.recipient_addr = recipient_addr.into();
        self
    }

    /// True if every participant should process the message
    pub fn is_broadcast(&self) -> bool {
        self.recipient_addr.is_empty()
    }
}

/// Work item handed to the air-gapped executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Operation id
    pub id: String,
    /// Await state that produced the operation
    #[serde(rename = "type")]
    pub operation_type: State,
    /// Encoded response of the producing step
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    /// Messages produced by the executor
    #[serde(default)]
    pub result_msgs: Vec<Message>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Round the operation belongs to
    pub dkg_round_id: String,
    /// Recipient title for addressed results; empty for broadcast
    #[serde(default)]
    pub to: String,
    /// Event the results feed, set by the executor
    #[serde(default)]
    pub event: Option<Event>,
}

impl Operation {
    /// Fresh operation for `state` with an encoded response
    pub fn new(dkg_round_id: impl Into<String>, operation_type: State, payload: Vec<u8>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_type,
            payload,
            result_msgs: Vec::new(),
            created_at: Utc::now(),
            dkg_round_id: dkg_round_id.into(),
            to: String::new(),
            event: None,
        }
    }
}
