//! Quorum lookup of an identity's aggregated public key

use crate::node::{LookupRequest, NodeSet, NodeTransport};
use crate::quorum::{NodeReply, QuorumRequester, Stage};
use crate::types::{AggregatedPublicKey, VerifierIdentity};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Look up the key the node set holds for `identity`
///
/// `threshold` identical answers decide. Agreement that no key exists is
/// `Error::KeyNotFound`.
#[instrument(skip(transport, quorum, nodes, identity), fields(identity = %identity))]
pub async fn lookup_key<T: NodeTransport + ?Sized>(
    transport: &T,
    quorum: &QuorumRequester,
    nodes: &NodeSet,
    threshold: usize,
    identity: &VerifierIdentity,
) -> Result<AggregatedPublicKey> {
    let request = &LookupRequest::from(identity);

    let outcome = quorum
        .collect(
            Stage::Lookup,
            nodes.endpoints(),
            threshold,
            |endpoint| async move {
                let signed = transport.lookup(endpoint, request).await?;
                let body = nodes.verify(endpoint.index, signed)?;
                if !body.is_for(identity) {
                    return Err(Error::invalid_response(
                        endpoint.index,
                        "Lookup reply is for a different identity",
                    ));
                }
                body.key()
                    .map_err(|e| Error::invalid_response(endpoint.index, e.to_string()))
            },
            |replies| agreed_outcome(replies, threshold),
        )
        .await?;

    match outcome {
        Some(key) => {
            info!(pub_key_x = %key.x_hex(), "Key found");
            Ok(key)
        }
        None => {
            debug!("Quorum reports no key");
            Err(Error::KeyNotFound {
                verifier: identity.verifier.clone(),
                verifier_id: identity.verifier_id.clone(),
            })
        }
    }
}

/// The outcome reported by at least `threshold` nodes, if any
fn agreed_outcome(
    replies: &mut Vec<NodeReply<Option<AggregatedPublicKey>>>,
    threshold: usize,
) -> Option<Option<AggregatedPublicKey>> {
    let mut counts: HashMap<Option<AggregatedPublicKey>, usize> = HashMap::new();
    for reply in replies.iter() {
        let count = counts.entry(reply.value).or_insert(0);
        *count += 1;
        if *count >= threshold {
            return Some(reply.value);
        }
    }
    None
}
