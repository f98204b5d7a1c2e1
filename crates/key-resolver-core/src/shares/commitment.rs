//! Commitment round: bind the token and ephemeral key to each node

use crate::node::{CommitmentRequest, NodeSet, NodeSignature, NodeTransport};
use crate::quorum::{QuorumRequester, Stage};
use crate::{Error, Result};
use tracing::{info, instrument};

/// Register `request` with the node set and gather signed acks
///
/// An ack counts only if it carries the endpoint's own signature, echoes
/// the request and names the node key registered for that endpoint. At
/// least `threshold` acks are required; acks arriving before the stage
/// settles are kept too, so the share round has spare signers.
#[instrument(
    skip(transport, quorum, nodes, request),
    fields(verifier = %request.verifier, timestamp = request.timestamp)
)]
pub async fn request_commitments<T: NodeTransport + ?Sized>(
    transport: &T,
    quorum: &QuorumRequester,
    nodes: &NodeSet,
    threshold: usize,
    request: &CommitmentRequest,
) -> Result<Vec<NodeSignature>> {
    let replies = quorum
        .collect_settled(Stage::Commitment, nodes.endpoints(), threshold, |endpoint| {
            async move {
                let node = endpoint.index;
                let signed = transport.commitment(endpoint, request).await?;
                nodes.check(node, &signed)?;

                let ack = &signed.body;
                if !ack.matches(request) {
                    return Err(Error::invalid_response(node, "Ack does not echo the commitment"));
                }
                let registered = nodes
                    .public_key(node)
                    .ok_or_else(|| Error::invalid_response(node, "Unknown node index"))?;
                if !ack.node_pub_x.eq_ignore_ascii_case(&registered.x)
                    || !ack.node_pub_y.eq_ignore_ascii_case(&registered.y)
                {
                    return Err(Error::invalid_response(node, "Ack names a different node key"));
                }

                Ok(NodeSignature {
                    node_index: node,
                    ack: signed,
                })
            }
        })
        .await?;

    info!(signatures = replies.len(), "Commitments acknowledged");
    Ok(replies.into_iter().map(|reply| reply.value).collect())
}
