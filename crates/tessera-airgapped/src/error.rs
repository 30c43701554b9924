//! Executor error type.

use serde::{Deserialize, Serialize};
use tessera_dkg::DkgError;
use tessera_protocol::ProtocolError;

/// Error returned by the air-gapped executor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum AirgappedError {
    /// Protocol decoding or encoding failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// DKG or signature primitive failed
    #[error("DKG error: {message}")]
    Dkg {
        /// Primitive error message
        message: String,
    },

    /// Passphrase not set
    #[error("Executor is locked")]
    Locked,

    /// Sealing or unsealing failed
    #[error("Sealing error: {message}")]
    Sealing {
        /// What failed
        message: String,
    },

    /// Key store access failed or a record is missing
    #[error("Storage error: {message}")]
    Storage {
        /// What failed
        message: String,
    },

    /// Operation type the executor does not handle, or one it cannot attribute
    #[error("Unsupported operation: {message}")]
    UnsupportedOperation {
        /// Operation description
        message: String,
    },

    /// Configuration or record encoding error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Underlying decoder message
        message: String,
    },
}

impl AirgappedError {
    /// Create a sealing error
    pub fn sealing(message: impl Into<String>) -> Self {
        Self::Sealing {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<DkgError> for AirgappedError {
    fn from(err: DkgError) -> Self {
        Self::Dkg {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AirgappedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result alias for executor operations
pub type Result<T> = std::result::Result<T, AirgappedError>;
