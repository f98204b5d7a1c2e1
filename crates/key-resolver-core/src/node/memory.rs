//! In-memory node network for testing and local simulation
//!
//! Each simulated node signs its replies with its own key and holds one
//! Shamir share per assigned identity. Faults can be injected per node
//! and per RPC method to exercise the client's quorum handling.

use super::{
    AssignAck, AssignRequest, CommitmentAck, CommitmentRequest, KeyShareEntry, LookupRequest,
    LookupResponse, NodeTransport, RpcMethod, ShareRequest, ShareResponse, Signed, async_trait,
};
use crate::crypto::ecies::encrypt_share;
use crate::types::{
    AggregatedPublicKey, NodeEndpoint, NodePublicKey, PrivateKey, TokenCommitment,
    VerifierIdentity,
};
use crate::{Error, Result};
use dashmap::DashMap;
use k256::{
    ProjectivePoint, Scalar,
    ecdsa::SigningKey,
    elliptic_curve::Field,
};
use rand::rngs::OsRng;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;
use zeroize::Zeroizing;

/// Misbehaviour injected into one node's handling of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Never replies
    Silent,
    /// Fails at the transport level
    Unreachable,
    /// Signs with a key that is not the node's
    CorruptSignature,
    /// Serves an unrelated share
    WrongShare,
    /// Reports a public key other than the identity's
    WrongPublicKey,
}

/// Key material held by the simulated network for one identity
struct AssignedKey {
    public_key: AggregatedPublicKey,
    private_key: PrivateKey,
    /// Share `i` belongs to node `i` and sits at `x = i + 1`
    shares: Vec<Zeroizing<Scalar>>,
}

struct NetworkState {
    threshold: usize,
    node_keys: Vec<SigningKey>,
    rogue_key: SigningKey,
    keys: DashMap<VerifierIdentity, AssignedKey>,
    commitments: DashMap<(usize, TokenCommitment), CommitmentRequest>,
    faults: DashMap<(usize, RpcMethod), Fault>,
    requests: DashMap<(usize, RpcMethod), usize>,
    generations: AtomicUsize,
}

/// Simulated network of key-management nodes
///
/// Cheap to clone; clones share the same nodes.
#[derive(Clone)]
pub struct MemoryNodeNetwork {
    state: Arc<NetworkState>,
}

impl MemoryNodeNetwork {
    /// Create `nodes` nodes holding `threshold`-of-`nodes` shares
    pub fn new(nodes: usize, threshold: usize) -> Result<Self> {
        if threshold == 0 || threshold > nodes {
            return Err(Error::InvalidConfig(format!(
                "Threshold {} invalid for {} nodes",
                threshold, nodes
            )));
        }
        let node_keys = (0..nodes).map(|_| SigningKey::random(&mut OsRng)).collect();
        Ok(Self {
            state: Arc::new(NetworkState {
                threshold,
                node_keys,
                rogue_key: SigningKey::random(&mut OsRng),
                keys: DashMap::new(),
                commitments: DashMap::new(),
                faults: DashMap::new(),
                requests: DashMap::new(),
                generations: AtomicUsize::new(0),
            }),
        })
    }

    pub fn threshold(&self) -> usize {
        self.state.threshold
    }

    /// Endpoints addressing every node, in index order
    pub fn endpoints(&self) -> Vec<NodeEndpoint> {
        let nodes = self.state.node_keys.len();
        NodeEndpoint::from_urls((0..nodes).map(|i| format!("memory://node-{}", i)))
    }

    /// Public keys the nodes sign with, in index order
    pub fn node_public_keys(&self) -> Vec<NodePublicKey> {
        self.state
            .node_keys
            .iter()
            .map(|key| NodePublicKey::from_verifying_key(key.verifying_key()))
            .collect()
    }

    /// Inject a fault into one node's handling of `method`
    pub fn set_fault(&self, node: usize, method: RpcMethod, fault: Fault) {
        self.state.faults.insert((node, method), fault);
    }

    /// Inject the same fault into every node
    pub fn set_fault_all(&self, method: RpcMethod, fault: Fault) {
        for node in 0..self.state.node_keys.len() {
            self.set_fault(node, method, fault);
        }
    }

    pub fn clear_faults(&self) {
        self.state.faults.clear();
    }

    /// Number of `method` requests node `node` has received
    pub fn requests(&self, node: usize, method: RpcMethod) -> usize {
        self.state
            .requests
            .get(&(node, method))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Number of keys generated across the network
    pub fn key_generations(&self) -> usize {
        self.state.generations.load(Ordering::SeqCst)
    }

    /// Assign a chosen key to an identity, splitting it across the nodes
    pub fn insert_key(&self, identity: VerifierIdentity, private_key: &PrivateKey) -> Result<()> {
        let key = self.split_key(private_key.scalar())?;
        self.state.keys.insert(identity, key);
        Ok(())
    }

    /// The full private key assigned to an identity
    ///
    /// Only a simulation can answer this; real nodes never hold it.
    pub fn private_key(&self, identity: &VerifierIdentity) -> Option<PrivateKey> {
        self.state
            .keys
            .get(identity)
            .map(|key| key.private_key.clone())
    }

    fn split_key(&self, secret: &Scalar) -> Result<AssignedKey> {
        let mut coefficients = Vec::with_capacity(self.state.threshold);
        coefficients.push(Zeroizing::new(*secret));
        for _ in 1..self.state.threshold {
            coefficients.push(Zeroizing::new(Scalar::random(&mut OsRng)));
        }

        let shares = (0..self.state.node_keys.len())
            .map(|node| Zeroizing::new(evaluate_polynomial(&coefficients, node as u64 + 1)))
            .collect();
        let private_key = PrivateKey::from_scalar(secret);

        Ok(AssignedKey {
            public_key: private_key.public_key()?,
            private_key,
            shares,
        })
    }

    async fn enter(&self, node: usize, method: RpcMethod) -> Result<Option<Fault>> {
        if node >= self.state.node_keys.len() {
            return Err(Error::Transport(format!("No such node {}", node)));
        }
        *self.state.requests.entry((node, method)).or_insert(0) += 1;

        let fault = self.state.faults.get(&(node, method)).map(|f| *f);
        match fault {
            Some(Fault::Silent) => std::future::pending().await,
            Some(Fault::Unreachable) => Err(Error::Transport(format!(
                "Node {} unreachable",
                node
            ))),
            other => Ok(other),
        }
    }

    fn sign<T: Serialize>(&self, node: usize, fault: Option<Fault>, body: T) -> Result<Signed<T>> {
        let key = match fault {
            Some(Fault::CorruptSignature) => &self.state.rogue_key,
            _ => &self.state.node_keys[node],
        };
        Signed::sign(body, key)
    }

    fn node_public_key(&self, node: usize) -> NodePublicKey {
        NodePublicKey::from_verifying_key(self.state.node_keys[node].verifying_key())
    }

    /// Whether the share request carries a threshold of valid commitment acks for its token
    fn check_signatures(&self, request: &ShareRequest) -> Option<CommitmentAck> {
        let mut valid = Vec::new();
        for signature in &request.node_signatures {
            let Some(key) = self.state.node_keys.get(signature.node_index) else {
                continue;
            };
            if signature.ack.verify(key.verifying_key()).is_err() {
                continue;
            }
            let ack = &signature.ack.body;
            if ack.verifier == request.verifier
                && ack.token_commitment.opens_to(&request.id_token)
            {
                valid.push(ack.clone());
            }
        }
        if valid.len() < self.state.threshold {
            return None;
        }
        valid.into_iter().next()
    }
}

fn evaluate_polynomial(coefficients: &[Zeroizing<Scalar>], x: u64) -> Scalar {
    let x_scalar = Scalar::from(x);
    let mut result = Scalar::ZERO;
    for coef in coefficients.iter().rev() {
        result = result * x_scalar + **coef;
    }
    result
}

fn unrelated_public_key() -> Result<AggregatedPublicKey> {
    AggregatedPublicKey::from_point(&(ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng)))
}

#[async_trait]
impl NodeTransport for MemoryNodeNetwork {
    async fn lookup(
        &self,
        endpoint: &NodeEndpoint,
        request: &LookupRequest,
    ) -> Result<Signed<LookupResponse>> {
        let node = endpoint.index;
        let fault = self.enter(node, RpcMethod::Lookup).await?;
        let identity = VerifierIdentity::new(&request.verifier, &request.verifier_id);

        let known = self.state.keys.get(&identity).map(|key| key.public_key);
        let response = match (known, fault) {
            (Some(_), Some(Fault::WrongPublicKey)) => {
                LookupResponse::found(&identity, &unrelated_public_key()?)
            }
            (Some(public_key), _) => LookupResponse::found(&identity, &public_key),
            (None, _) => LookupResponse::absent(&identity),
        };
        self.sign(node, fault, response)
    }

    async fn assign(
        &self,
        endpoint: &NodeEndpoint,
        request: &AssignRequest,
    ) -> Result<Signed<AssignAck>> {
        let node = endpoint.index;
        let fault = self.enter(node, RpcMethod::Assign).await?;
        let identity = VerifierIdentity::new(&request.verifier, &request.verifier_id);

        if !self.state.keys.contains_key(&identity) {
            let key = self.split_key(&Scalar::random(&mut OsRng))?;
            self.state.keys.entry(identity.clone()).or_insert_with(|| {
                self.state.generations.fetch_add(1, Ordering::SeqCst);
                debug!(node, identity = %identity, "Generated key");
                key
            });
        }

        let ack = AssignAck {
            verifier: request.verifier.clone(),
            verifier_id: request.verifier_id.clone(),
            assigned: true,
        };
        self.sign(node, fault, ack)
    }

    async fn commitment(
        &self,
        endpoint: &NodeEndpoint,
        request: &CommitmentRequest,
    ) -> Result<Signed<CommitmentAck>> {
        let node = endpoint.index;
        let fault = self.enter(node, RpcMethod::Commitment).await?;

        self.state
            .commitments
            .insert((node, request.token_commitment.clone()), request.clone());
        let ack = CommitmentAck::for_request(request, &self.node_public_key(node));
        self.sign(node, fault, ack)
    }

    async fn share(
        &self,
        endpoint: &NodeEndpoint,
        request: &ShareRequest,
    ) -> Result<Signed<ShareResponse>> {
        let node = endpoint.index;
        let fault = self.enter(node, RpcMethod::Share).await?;

        let ack = self.check_signatures(request).ok_or_else(|| {
            Error::invalid_response(node, "Share request lacks a threshold of valid signatures")
        })?;
        let commitment = TokenCommitment::from_id_token(&request.id_token);
        if !self.state.commitments.contains_key(&(node, commitment)) {
            return Err(Error::invalid_response(node, "No commitment registered"));
        }

        let identity = VerifierIdentity::new(&request.verifier, &request.verifier_id);
        let (public_key, share) = {
            let key = self
                .state
                .keys
                .get(&identity)
                .ok_or_else(|| Error::invalid_response(node, "No key assigned"))?;
            (key.public_key, Zeroizing::new(*key.shares[node]))
        };

        let recipient = k256::PublicKey::from_sec1_bytes(
            &AggregatedPublicKey::from_hex(&ack.temp_pub_x, &ack.temp_pub_y)?.to_uncompressed(),
        )
        .map_err(|_| Error::invalid_response(node, "Invalid ephemeral public key"))?;

        let served = match fault {
            Some(Fault::WrongShare) => Zeroizing::new(Scalar::random(&mut OsRng)),
            _ => share,
        };
        let reported = match fault {
            Some(Fault::WrongPublicKey) => unrelated_public_key()?,
            _ => public_key,
        };

        let entry = KeyShareEntry {
            index: hex::encode(Scalar::from(node as u64 + 1).to_bytes()),
            public_key: reported,
            share: encrypt_share(&recipient, &served.to_bytes())?,
        };
        self.sign(node, fault, ShareResponse { keys: vec![entry] })
    }
}
