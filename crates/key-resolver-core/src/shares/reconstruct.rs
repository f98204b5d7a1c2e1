//! Share retrieval, decryption and Lagrange reconstruction
//!
//! Shares are requested from every node that signed the commitment. Each
//! share must come with the node's signature, name the expected public
//! key and decrypt under the ephemeral key. Once `threshold` shares with
//! distinct indices are in, every new share is tried in the subsets it
//! completes until one interpolates to a key matching the expected
//! public key. Only when the shares run out without a match is the
//! retrieval a mismatch.

use crate::crypto::{self, EphemeralKeyPair, ecies::decrypt_share};
use crate::node::{KeyShareEntry, NodeSet, NodeSignature, NodeTransport, ShareRequest};
use crate::quorum::{QuorumRequester, Stage};
use crate::types::{AggregatedPublicKey, NodeEndpoint, PrivateKey, VerifierIdentity};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::iter;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Inputs of one share retrieval
pub struct ShareRetrieval<'a> {
    pub identity: &'a VerifierIdentity,
    pub id_token: &'a str,
    pub extra_params: &'a serde_json::Value,
    pub signatures: &'a [NodeSignature],
    pub expected: &'a AggregatedPublicKey,
    pub ephemeral: &'a EphemeralKeyPair,
}

/// A decrypted share and its interpolation index
pub struct DecryptedShare {
    pub index: Scalar,
    pub value: Zeroizing<Scalar>,
}

impl fmt::Debug for DecryptedShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedShare")
            .field("index", &hex::encode(self.index.to_bytes()))
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// A reconstructed key, verified against its public key
#[derive(Debug)]
pub struct ReconstructedKey {
    pub public_key: AggregatedPublicKey,
    pub private_key: PrivateKey,
}

/// Retrieve `threshold` shares and reconstruct the identity's key
#[instrument(
    skip_all,
    fields(identity = %retrieval.identity, signers = retrieval.signatures.len())
)]
pub async fn retrieve_and_reconstruct<T: NodeTransport + ?Sized>(
    transport: &T,
    quorum: &QuorumRequester,
    nodes: &NodeSet,
    threshold: usize,
    retrieval: &ShareRetrieval<'_>,
) -> Result<ReconstructedKey> {
    let signers: HashSet<usize> = retrieval.signatures.iter().map(|s| s.node_index).collect();
    let endpoints: Vec<NodeEndpoint> = nodes
        .endpoints()
        .iter()
        .filter(|endpoint| signers.contains(&endpoint.index))
        .cloned()
        .collect();
    if endpoints.len() < threshold {
        return Err(Error::NodesUnavailable {
            stage: Stage::Share,
            required: threshold,
            valid: endpoints.len(),
        });
    }

    let request = &ShareRequest {
        verifier: retrieval.identity.verifier.clone(),
        verifier_id: retrieval.identity.verifier_id.clone(),
        id_token: retrieval.id_token.to_string(),
        node_signatures: retrieval.signatures.to_vec(),
        extra_params: retrieval.extra_params.clone(),
    };

    let expected = retrieval.expected.to_point()?;
    let mut mismatched = false;

    let outcome = quorum
        .collect(
            Stage::Share,
            &endpoints,
            threshold,
            |endpoint| async move {
                let node = endpoint.index;
                let signed = transport.share(endpoint, request).await?;
                let response = nodes.verify(node, signed)?;
                open_share(node, response.keys.first(), retrieval)
            },
            |replies| {
                let last = replies.last()?.value.index;
                if replies[..replies.len() - 1]
                    .iter()
                    .any(|reply| reply.value.index == last)
                {
                    let duplicate = replies.pop()?;
                    warn!(node = duplicate.node, "Discarding share with duplicate index");
                    return None;
                }
                if replies.len() < threshold {
                    return None;
                }
                let shares: Vec<&DecryptedShare> = replies.iter().map(|r| &r.value).collect();
                let secret = reconstruct_with_newest(&shares, threshold, &expected);
                if secret.is_none() {
                    mismatched = true;
                    debug!(shares = shares.len(), "No matching subset yet");
                }
                secret
            },
        )
        .await;

    let secret = match outcome {
        Ok(secret) => secret,
        Err(Error::NodesUnavailable { .. } | Error::InsufficientQuorum { .. }) if mismatched => {
            warn!("No share subset reconstructs the expected public key");
            return Err(Error::ReconstructionMismatch);
        }
        Err(e) => return Err(e),
    };

    info!(threshold, "Key reconstructed");
    Ok(ReconstructedKey {
        public_key: *retrieval.expected,
        private_key: PrivateKey::from_scalar(&secret),
    })
}

/// Validate and decrypt one node's share entry
fn open_share(
    node: usize,
    entry: Option<&KeyShareEntry>,
    retrieval: &ShareRetrieval<'_>,
) -> Result<DecryptedShare> {
    let entry = entry.ok_or_else(|| Error::invalid_response(node, "No share in reply"))?;
    if entry.public_key != *retrieval.expected {
        return Err(Error::invalid_response(node, "Share is for a different public key"));
    }

    let index = *crypto::scalar_from_hex(&entry.index)
        .map_err(|e| Error::invalid_response(node, format!("Invalid share index: {}", e)))?;
    if bool::from(index.is_zero()) {
        return Err(Error::invalid_response(node, "Share index is zero"));
    }

    let plaintext = decrypt_share(retrieval.ephemeral.secret(), &entry.share)
        .map_err(|e| Error::invalid_response(node, e.to_string()))?;
    let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
        plaintext
            .as_slice()
            .try_into()
            .map_err(|_| Error::invalid_response(node, "Share is not 32 bytes"))?,
    );
    let value = crypto::scalar_from_bytes(&bytes)
        .map_err(|e| Error::invalid_response(node, e.to_string()))?;

    debug!(node, "Share decrypted");
    Ok(DecryptedShare { index, value })
}

/// Interpolate every `threshold`-sized subset that contains the newest
/// share and return the first secret matching `expected`
fn reconstruct_with_newest(
    shares: &[&DecryptedShare],
    threshold: usize,
    expected: &ProjectivePoint,
) -> Option<Zeroizing<Scalar>> {
    let (newest, earlier) = shares.split_last()?;
    for subset in combinations(earlier.len(), threshold.checked_sub(1)?) {
        let picked: Vec<&DecryptedShare> = subset
            .iter()
            .map(|&i| earlier[i])
            .chain(iter::once(*newest))
            .collect();
        match interpolate_at_zero(&picked) {
            Ok(secret) if ProjectivePoint::GENERATOR * *secret == *expected => {
                return Some(secret);
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Skipping share subset"),
        }
    }
    None
}

/// All `k`-element index subsets of `0..n`, in lexicographic order
fn combinations(n: usize, k: usize) -> Vec<Vec<usize>> {
    if k > n {
        return Vec::new();
    }
    let mut subsets = Vec::new();
    let mut current: Vec<usize> = (0..k).collect();
    loop {
        subsets.push(current.clone());
        let Some(i) = (0..k).rev().find(|&i| current[i] < n - k + i) else {
            break;
        };
        current[i] += 1;
        for j in i + 1..k {
            current[j] = current[j - 1] + 1;
        }
    }
    subsets
}

/// Lagrange interpolation of the shares' polynomial at zero
pub fn interpolate_at_zero<S: Borrow<DecryptedShare>>(shares: &[S]) -> Result<Zeroizing<Scalar>> {
    if shares.is_empty() {
        return Err(Error::Crypto("No shares to interpolate".into()));
    }
    let mut secret = Zeroizing::new(Scalar::ZERO);
    let shares: Vec<&DecryptedShare> = shares
        .iter()
        .map(<S as Borrow<DecryptedShare>>::borrow)
        .collect();
    for (i, share) in shares.iter().enumerate() {
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (j, other) in shares.iter().enumerate() {
            if i != j {
                numerator *= other.index;
                denominator *= other.index - share.index;
            }
        }
        let inverse = Option::<Scalar>::from(denominator.invert())
            .ok_or_else(|| Error::Crypto("Duplicate share indices".into()))?;
        *secret += *share.value * numerator * inverse;
    }
    Ok(secret)
}
