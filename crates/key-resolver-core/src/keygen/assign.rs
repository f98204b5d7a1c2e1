//! Key assignment for identities the node set does not know yet

use crate::node::{AssignRequest, NodeSet, NodeTransport};
use crate::quorum::{QuorumRequester, Stage};
use crate::types::VerifierIdentity;
use crate::{Error, Result};
use tracing::{info, instrument};

/// Ask the node set to assign a key to `identity`
///
/// Succeeds once `threshold` nodes have acknowledged the assignment with
/// a valid signature. No key material is returned.
#[instrument(skip(transport, quorum, nodes, identity), fields(identity = %identity))]
pub async fn assign_key<T: NodeTransport + ?Sized>(
    transport: &T,
    quorum: &QuorumRequester,
    nodes: &NodeSet,
    threshold: usize,
    identity: &VerifierIdentity,
) -> Result<()> {
    let request = &AssignRequest {
        verifier: identity.verifier.clone(),
        verifier_id: identity.verifier_id.clone(),
        node_pub_keys: nodes.public_keys().to_vec(),
    };

    let acks = quorum
        .collect_threshold(Stage::Assign, nodes.endpoints(), threshold, |endpoint| async move {
            let signed = transport.assign(endpoint, request).await?;
            let ack = nodes.verify(endpoint.index, signed)?;
            if ack.verifier != identity.verifier || ack.verifier_id != identity.verifier_id {
                return Err(Error::invalid_response(
                    endpoint.index,
                    "Assignment ack is for a different identity",
                ));
            }
            if !ack.assigned {
                return Err(Error::invalid_response(endpoint.index, "Assignment refused"));
            }
            Ok(())
        })
        .await?;

    info!(acks = acks.len(), "Key assigned");
    Ok(())
}
