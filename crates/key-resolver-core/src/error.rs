//! Error types for key resolution and share retrieval

use crate::quorum::Stage;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for key resolution operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving keys or retrieving shares
///
/// Variants never carry secret material (tokens, shares or keys).
#[derive(Debug, Error)]
pub enum Error {
    // ============ Configuration Errors ============
    /// Invalid resolver or network configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key lookup still failed after a key was assigned
    #[error("Configuration error: lookup after key assignment failed: {0}")]
    Configuration(String),

    // ============ Lookup Errors ============
    /// A quorum of nodes agrees the identity has no key yet
    #[error("No key assigned for {verifier}/{verifier_id}")]
    KeyNotFound {
        verifier: String,
        verifier_id: String,
    },

    // ============ Quorum Errors ============
    /// Every node answered but too few valid responses were collected
    #[error("Nodes unavailable during {stage}: {valid} valid responses, {required} required")]
    NodesUnavailable {
        stage: Stage,
        required: usize,
        valid: usize,
    },

    /// The stage timeout elapsed before the quorum was reached
    #[error("Insufficient quorum during {stage}: {valid} valid responses, {required} required")]
    InsufficientQuorum {
        stage: Stage,
        required: usize,
        valid: usize,
    },

    /// A single node returned a response that failed validation
    #[error("Invalid response from node {node}: {reason}")]
    NodeResponseInvalid { node: usize, reason: String },

    /// The overall operation deadline elapsed
    #[error("Operation deadline of {0:?} exceeded")]
    Timeout(Duration),

    // ============ Reconstruction Errors ============
    /// The reconstructed key does not match the aggregated public key
    #[error("Reconstructed key does not match the expected public key")]
    ReconstructionMismatch,

    /// The pipeline finished without producing a usable key
    #[error("Unable to derive private key")]
    UnableToDerive,

    // ============ Cryptographic Errors ============
    /// The system random source failed repeatedly
    #[error("Random source exhausted")]
    RandomSourceExhausted,

    /// The ephemeral keypair could not be generated
    #[error("Ephemeral keypair generation failed: {0}")]
    KeypairGenerationFailed(String),

    /// Bit range outside the buffer or wider than 64 bits
    #[error("Range error: {0}")]
    Range(String),

    /// Cryptographic operation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    // ============ External Service Errors ============
    /// Transport-level failure talking to a node
    #[error("Transport error: {0}")]
    Transport(String),

    /// Metadata service failure
    #[error("Metadata error: {0}")]
    Metadata(String),

    // ============ Serialization Errors ============
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a per-node validation failure
    pub fn invalid_response(node: usize, reason: impl Into<String>) -> Self {
        Error::NodeResponseInvalid {
            node,
            reason: reason.into(),
        }
    }

    /// Faults confined to one node; the quorum absorbs these
    pub fn is_node_local(&self) -> bool {
        matches!(
            self,
            Error::NodeResponseInvalid { .. } | Error::Transport(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Deserialization(e.to_string())
    }
}
