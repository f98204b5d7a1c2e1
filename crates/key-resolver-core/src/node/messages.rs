//! Request and reply records exchanged with nodes

use crate::crypto::ecies::EncryptedShare;
use crate::types::{AggregatedPublicKey, NodePublicKey, TokenCommitment, VerifierIdentity};
use crate::{Error, Result};
use k256::ecdsa::{
    Signature, SigningKey, VerifyingKey,
    signature::{Signer, Verifier},
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A reply body with the node's ECDSA signature over its JSON encoding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signed<T> {
    pub body: T,
    /// `r || s`, hex
    pub signature: String,
}

impl<T: Serialize> Signed<T> {
    /// Sign `body` with a node key
    pub fn sign(body: T, key: &SigningKey) -> Result<Self> {
        let bytes = serde_json::to_vec(&body)?;
        let signature: Signature = key.sign(&bytes);
        Ok(Self {
            body,
            signature: hex::encode(signature.to_bytes()),
        })
    }

    /// Check the signature against `key`
    pub fn verify(&self, key: &VerifyingKey) -> Result<()> {
        let bytes = serde_json::to_vec(&self.body)?;
        let raw = hex::decode(&self.signature)?;
        let signature = Signature::from_slice(&raw)
            .map_err(|e| Error::Crypto(format!("Malformed signature: {}", e)))?;
        key.verify(&bytes, &signature)
            .map_err(|_| Error::Crypto("Signature verification failed".into()))
    }

    /// Verify and unwrap the body, attributing failure to `node`
    pub fn into_verified(self, node: usize, key: &VerifyingKey) -> Result<T> {
        self.verify(key)
            .map_err(|e| Error::invalid_response(node, e.to_string()))?;
        Ok(self.body)
    }
}

// ============ Lookup ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRequest {
    pub verifier: String,
    pub verifier_id: String,
}

impl From<&VerifierIdentity> for LookupRequest {
    fn from(identity: &VerifierIdentity) -> Self {
        Self {
            verifier: identity.verifier.clone(),
            verifier_id: identity.verifier_id.clone(),
        }
    }
}

/// A node's view of the identity's key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupResponse {
    pub found: bool,
    pub verifier: String,
    pub verifier_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key_x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_key_y: Option<String>,
}

impl LookupResponse {
    pub fn found(identity: &VerifierIdentity, key: &AggregatedPublicKey) -> Self {
        Self {
            found: true,
            verifier: identity.verifier.clone(),
            verifier_id: identity.verifier_id.clone(),
            pub_key_x: Some(key.x_hex()),
            pub_key_y: Some(key.y_hex()),
        }
    }

    pub fn absent(identity: &VerifierIdentity) -> Self {
        Self {
            found: false,
            verifier: identity.verifier.clone(),
            verifier_id: identity.verifier_id.clone(),
            pub_key_x: None,
            pub_key_y: None,
        }
    }

    /// Whether the reply is about `identity`
    pub fn is_for(&self, identity: &VerifierIdentity) -> bool {
        self.verifier == identity.verifier && self.verifier_id == identity.verifier_id
    }

    /// The reported key, `None` when the node has no key for the identity
    pub fn key(&self) -> Result<Option<AggregatedPublicKey>> {
        if !self.found {
            return Ok(None);
        }
        match (&self.pub_key_x, &self.pub_key_y) {
            (Some(x), Some(y)) => AggregatedPublicKey::from_hex(x, y).map(Some),
            _ => Err(Error::Deserialization(
                "Lookup reply marked found without coordinates".into(),
            )),
        }
    }
}

// ============ Assignment ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRequest {
    pub verifier: String,
    pub verifier_id: String,
    /// Public keys of the participating nodes, in endpoint order
    pub node_pub_keys: Vec<NodePublicKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignAck {
    pub verifier: String,
    pub verifier_id: String,
    pub assigned: bool,
}

// ============ Commitment ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRequest {
    pub verifier: String,
    pub token_commitment: TokenCommitment,
    /// Ephemeral public key coordinates, 64 hex digits each
    pub temp_pub_x: String,
    pub temp_pub_y: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// A node's signed agreement to serve shares for one commitment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentAck {
    pub verifier: String,
    pub token_commitment: TokenCommitment,
    pub temp_pub_x: String,
    pub temp_pub_y: String,
    pub timestamp: i64,
    pub node_pub_x: String,
    pub node_pub_y: String,
}

impl CommitmentAck {
    pub fn for_request(request: &CommitmentRequest, node_key: &NodePublicKey) -> Self {
        Self {
            verifier: request.verifier.clone(),
            token_commitment: request.token_commitment.clone(),
            temp_pub_x: request.temp_pub_x.clone(),
            temp_pub_y: request.temp_pub_y.clone(),
            timestamp: request.timestamp,
            node_pub_x: node_key.x.clone(),
            node_pub_y: node_key.y.clone(),
        }
    }

    /// Whether the ack echoes `request` exactly
    pub fn matches(&self, request: &CommitmentRequest) -> bool {
        self.verifier == request.verifier
            && self.token_commitment == request.token_commitment
            && self.temp_pub_x == request.temp_pub_x
            && self.temp_pub_y == request.temp_pub_y
            && self.timestamp == request.timestamp
    }
}

/// A signed commitment ack, forwarded to the nodes with the share request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSignature {
    pub node_index: usize,
    pub ack: Signed<CommitmentAck>,
}

// ============ Shares ============

#[derive(Clone, Serialize, Deserialize)]
pub struct ShareRequest {
    pub verifier: String,
    pub verifier_id: String,
    pub id_token: String,
    pub node_signatures: Vec<NodeSignature>,
    /// Caller-supplied fields, forwarded verbatim
    #[serde(default)]
    pub extra_params: serde_json::Value,
}

impl fmt::Debug for ShareRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShareRequest")
            .field("verifier", &self.verifier)
            .field("verifier_id", &self.verifier_id)
            .field("id_token", &"[REDACTED]")
            .field("node_signatures", &self.node_signatures.len())
            .field("extra_params", &self.extra_params)
            .finish()
    }
}

/// One share held by a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyShareEntry {
    /// Interpolation index of the share, hex scalar
    pub index: String,
    /// The node's view of the aggregated public key
    pub public_key: AggregatedPublicKey,
    pub share: EncryptedShare,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareResponse {
    pub keys: Vec<KeyShareEntry>,
}
