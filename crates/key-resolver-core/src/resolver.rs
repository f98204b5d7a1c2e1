//! Address resolution and private key retrieval
//!
//! `KeyResolver` drives the full client protocol:
//!
//! 1. Lookup of the identity's aggregated public key, with key assignment
//!    and a second lookup when the nodes agree none exists
//! 2. Nonce lookup and address derivation
//! 3. For retrieval: an ephemeral keypair, the commitment round, share
//!    retrieval and reconstruction, then the nonce shift
//!
//! Retrieval runs under one overall deadline independent of the per-stage
//! timeouts.

use crate::clock::{Clock, SystemClock};
use crate::config::ResolverConfig;
use crate::crypto::{self, EphemeralKeyPair};
use crate::keygen::{assign_key, lookup_key};
use crate::metadata::{MetadataClient, fetch_nonce};
use crate::node::{CommitmentRequest, NodeSet, NodeTransport};
use crate::quorum::QuorumRequester;
use crate::shares::{ShareRetrieval, request_commitments, retrieve_and_reconstruct};
use crate::types::{
    AddressInfo, AggregatedPublicKey, KeyDetails, NodeEndpoint, NodePublicKey, RetrievedKey,
    TokenCommitment, VerifierIdentity,
};
use crate::{Error, Result};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Client for a network of key-management nodes
pub struct KeyResolver<T, M> {
    transport: T,
    metadata: M,
    config: ResolverConfig,
    quorum: QuorumRequester,
    clock: Arc<dyn Clock>,
    node_pub_keys: Arc<[NodePublicKey]>,
}

impl<T: NodeTransport, M: MetadataClient> KeyResolver<T, M> {
    /// Create a resolver; the config is validated here
    pub fn new(transport: T, metadata: M, config: ResolverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            metadata,
            quorum: QuorumRequester::new(config.stage_timeout())
                .with_settle_grace(config.settle_grace()),
            config,
            clock: Arc::new(SystemClock),
            node_pub_keys: Arc::from(Vec::new()),
        })
    }

    /// Replace the clock used for commitment timestamps
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Set the node public keys used to verify replies during retrieval
    pub fn with_node_public_keys(mut self, keys: Vec<NodePublicKey>) -> Self {
        self.set_node_public_keys(keys);
        self
    }

    pub fn set_node_public_keys(&mut self, keys: Vec<NodePublicKey>) {
        self.node_pub_keys = Arc::from(keys);
    }

    pub fn node_public_keys(&self) -> &[NodePublicKey] {
        &self.node_pub_keys
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve the account address of `identity`, assigning a key if none exists
    ///
    /// With `extended`, the result also carries the aggregated key, the
    /// nonce and the nonce-adjusted key.
    #[instrument(
        skip(self, endpoints, node_pub_keys, identity),
        fields(identity = %identity, nodes = endpoints.len())
    )]
    pub async fn resolve_address(
        &self,
        endpoints: &[NodeEndpoint],
        node_pub_keys: &[NodePublicKey],
        identity: &VerifierIdentity,
        extended: bool,
    ) -> Result<AddressInfo> {
        let nodes = self.node_set(endpoints, node_pub_keys)?;
        let public_key = self.lookup_or_assign(&nodes, identity).await?;
        let info = self.address_for(&public_key, extended).await?;
        info!(address = %info.address, "Address resolved");
        Ok(info)
    }

    /// Retrieve and reconstruct the nonce-adjusted private key of `identity`
    ///
    /// `id_token` authenticates the caller to the nodes; `extra_params`
    /// is forwarded to them untouched.
    #[instrument(
        skip(self, endpoints, identity, id_token, extra_params),
        fields(identity = %identity, nodes = endpoints.len())
    )]
    pub async fn retrieve_shares(
        &self,
        endpoints: &[NodeEndpoint],
        identity: &VerifierIdentity,
        id_token: &str,
        extra_params: serde_json::Value,
    ) -> Result<RetrievedKey> {
        let ephemeral = EphemeralKeyPair::generate()?;
        let deadline = self.config.overall_deadline();

        let outcome = tokio::time::timeout(
            deadline,
            self.run_retrieval(endpoints, identity, id_token, &extra_params, &ephemeral),
        )
        .await;

        match outcome {
            Err(_) => {
                warn!(deadline_secs = deadline.as_secs(), "Retrieval deadline exceeded");
                Err(Error::Timeout(deadline))
            }
            Ok(Ok(Some(key))) => {
                info!(address = %key.public_address, "Private key retrieved");
                Ok(key)
            }
            Ok(Ok(None)) => Err(Error::UnableToDerive),
            Ok(Err(e)) => Err(e),
        }
    }

    async fn run_retrieval(
        &self,
        endpoints: &[NodeEndpoint],
        identity: &VerifierIdentity,
        id_token: &str,
        extra_params: &serde_json::Value,
        ephemeral: &EphemeralKeyPair,
    ) -> Result<Option<RetrievedKey>> {
        let nodes = self.node_set(endpoints, &self.node_pub_keys)?;
        let expected = self.lookup_or_assign(&nodes, identity).await?;

        let commitment = CommitmentRequest {
            verifier: identity.verifier.clone(),
            token_commitment: TokenCommitment::from_id_token(id_token),
            temp_pub_x: ephemeral.public_x_hex(),
            temp_pub_y: ephemeral.public_y_hex(),
            timestamp: self.clock.now_unix(),
        };
        let signatures = request_commitments(
            &self.transport,
            &self.quorum,
            &nodes,
            self.config.threshold,
            &commitment,
        )
        .await?;
        if signatures.is_empty() {
            return Ok(None);
        }

        let retrieval = ShareRetrieval {
            identity,
            id_token,
            extra_params,
            signatures: &signatures,
            expected: &expected,
            ephemeral,
        };
        let reconstructed = retrieve_and_reconstruct(
            &self.transport,
            &self.quorum,
            &nodes,
            self.config.threshold,
            &retrieval,
        )
        .await?;

        let nonce = fetch_nonce(&self.metadata, &reconstructed.public_key).await?;
        let private_key = reconstructed.private_key.add_nonce(&nonce);
        if private_key.is_zero() {
            warn!("Nonce cancels the reconstructed key");
            return Ok(None);
        }

        let public_address = private_key.address()?;
        Ok(Some(RetrievedKey {
            private_key,
            public_address,
        }))
    }

    fn node_set(
        &self,
        endpoints: &[NodeEndpoint],
        node_pub_keys: &[NodePublicKey],
    ) -> Result<NodeSet> {
        let nodes = NodeSet::new(endpoints, node_pub_keys)?;
        self.config.validate_for(nodes.len())?;
        Ok(nodes)
    }

    async fn lookup_or_assign(
        &self,
        nodes: &NodeSet,
        identity: &VerifierIdentity,
    ) -> Result<AggregatedPublicKey> {
        let threshold = self.config.threshold;
        match lookup_key(&self.transport, &self.quorum, nodes, threshold, identity).await {
            Ok(key) => Ok(key),
            Err(Error::KeyNotFound { .. }) => {
                info!("No key assigned yet, requesting assignment");
                assign_key(&self.transport, &self.quorum, nodes, threshold, identity).await?;
                lookup_key(&self.transport, &self.quorum, nodes, threshold, identity)
                    .await
                    .map_err(|e| Error::Configuration(e.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn address_for(
        &self,
        public_key: &AggregatedPublicKey,
        extended: bool,
    ) -> Result<AddressInfo> {
        let nonce = fetch_nonce(&self.metadata, public_key).await?;

        let base = public_key.to_uncompressed();
        let effective = if nonce.is_zero() {
            base
        } else {
            let shift = nonce.public_key().to_affine().to_encoded_point(false);
            crypto::combine_public_keys(&[base.as_slice(), shift.as_bytes()], false)?
        };
        let address = crypto::derive_address(&effective)?;

        let details = extended.then(|| KeyDetails {
            public_key: *public_key,
            nonce,
            effective_public_key: hex::encode(&effective),
        });
        Ok(AddressInfo { address, details })
    }
}
