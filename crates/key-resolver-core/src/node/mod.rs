//! Node RPC contract
//!
//! The `NodeTransport` trait abstracts how requests reach a node, so the
//! protocol runs unchanged over HTTP, in memory, or any other carrier.
//! Every reply is signed by the node's long-term key and checked against
//! the key registered for that endpoint.

use crate::types::{NodeEndpoint, NodePublicKey};
use crate::{Error, Result};
use k256::ecdsa::VerifyingKey;
use serde::Serialize;
use std::collections::HashSet;

pub use async_trait::async_trait;

#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod messages;

#[cfg(feature = "http")]
pub use http::HttpNodeTransport;
pub use memory::{Fault, MemoryNodeNetwork};
pub use messages::{
    AssignAck, AssignRequest, CommitmentAck, CommitmentRequest, KeyShareEntry, LookupRequest,
    LookupResponse, NodeSignature, ShareRequest, ShareResponse, Signed,
};

/// Node RPC methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    Lookup,
    Assign,
    Commitment,
    Share,
}

impl RpcMethod {
    /// JSON-RPC method name
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcMethod::Lookup => "VerifierLookupRequest",
            RpcMethod::Assign => "KeyAssign",
            RpcMethod::Commitment => "CommitmentRequest",
            RpcMethod::Share => "ShareRequest",
        }
    }
}

/// Carries one request to one node and returns its signed reply
#[async_trait]
pub trait NodeTransport: Send + Sync {
    /// Ask a node which key it holds for an identity
    async fn lookup(
        &self,
        endpoint: &NodeEndpoint,
        request: &LookupRequest,
    ) -> Result<Signed<LookupResponse>>;

    /// Ask a node to assign a key to an identity that has none
    async fn assign(
        &self,
        endpoint: &NodeEndpoint,
        request: &AssignRequest,
    ) -> Result<Signed<AssignAck>>;

    /// Register the token commitment and ephemeral key with a node
    async fn commitment(
        &self,
        endpoint: &NodeEndpoint,
        request: &CommitmentRequest,
    ) -> Result<Signed<CommitmentAck>>;

    /// Request the node's encrypted share
    async fn share(
        &self,
        endpoint: &NodeEndpoint,
        request: &ShareRequest,
    ) -> Result<Signed<ShareResponse>>;
}

/// Endpoints paired with the public keys that sign their replies
#[derive(Debug, Clone)]
pub struct NodeSet {
    endpoints: Vec<NodeEndpoint>,
    public_keys: Vec<NodePublicKey>,
    verifying_keys: Vec<VerifyingKey>,
}

impl NodeSet {
    /// Pair endpoints with node keys, indexed by `NodeEndpoint::index`
    pub fn new(endpoints: &[NodeEndpoint], public_keys: &[NodePublicKey]) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::InvalidConfig("No node endpoints".into()));
        }
        let mut seen = HashSet::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if endpoint.index >= public_keys.len() {
                return Err(Error::InvalidConfig(format!(
                    "Endpoint {} ({}) has no node public key",
                    endpoint.index, endpoint.url
                )));
            }
            if !seen.insert(endpoint.index) {
                return Err(Error::InvalidConfig(format!(
                    "Duplicate endpoint index {}",
                    endpoint.index
                )));
            }
        }
        let verifying_keys = public_keys
            .iter()
            .map(NodePublicKey::verifying_key)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            endpoints: endpoints.to_vec(),
            public_keys: public_keys.to_vec(),
            verifying_keys,
        })
    }

    pub fn endpoints(&self) -> &[NodeEndpoint] {
        &self.endpoints
    }

    pub fn public_keys(&self) -> &[NodePublicKey] {
        &self.public_keys
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Verify a reply from `node` and return its body
    pub fn verify<T: Serialize>(&self, node: usize, signed: Signed<T>) -> Result<T> {
        signed.into_verified(node, self.verifying_key(node)?)
    }

    /// Verify a reply from `node` without consuming it
    pub fn check<T: Serialize>(&self, node: usize, signed: &Signed<T>) -> Result<()> {
        signed
            .verify(self.verifying_key(node)?)
            .map_err(|e| Error::invalid_response(node, e.to_string()))
    }

    fn verifying_key(&self, node: usize) -> Result<&VerifyingKey> {
        self.verifying_keys
            .get(node)
            .ok_or_else(|| Error::invalid_response(node, "Unknown node index"))
    }

    /// The key a node signs with
    pub fn public_key(&self, node: usize) -> Option<&NodePublicKey> {
        self.public_keys.get(node)
    }
}
