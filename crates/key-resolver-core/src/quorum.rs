//! Concurrent fan-out to the node set with early return on quorum
//!
//! Every stage of the protocol sends one request per node, keeps the
//! replies that validate and stops as soon as the stage's decision rule
//! is satisfied. Outstanding requests are dropped at that point.

use crate::config::DEFAULT_SETTLE_GRACE_MS;
use crate::types::NodeEndpoint;
use crate::{Error, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

/// Protocol stage, used in logs and quorum errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lookup,
    Assign,
    Commitment,
    Share,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Lookup => "lookup",
            Stage::Assign => "assign",
            Stage::Commitment => "commitment",
            Stage::Share => "share",
        };
        f.write_str(name)
    }
}

/// A validated reply and the node it came from
#[derive(Debug, Clone)]
pub struct NodeReply<T> {
    pub node: usize,
    pub value: T,
}

/// Sends a request to every node and gathers replies until a quorum forms
#[derive(Debug, Clone, Copy)]
pub struct QuorumRequester {
    stage_timeout: Duration,
    settle_grace: Duration,
}

impl QuorumRequester {
    pub fn new(stage_timeout: Duration) -> Self {
        Self {
            stage_timeout,
            settle_grace: Duration::from_millis(DEFAULT_SETTLE_GRACE_MS),
        }
    }

    /// Set how long `collect_settled` waits for stragglers after the quorum
    pub fn with_settle_grace(mut self, settle_grace: Duration) -> Self {
        self.settle_grace = settle_grace;
        self
    }

    pub fn stage_timeout(&self) -> Duration {
        self.stage_timeout
    }

    pub fn settle_grace(&self) -> Duration {
        self.settle_grace
    }

    /// Fan `request` out to all `endpoints` and run `decide` after every valid reply
    ///
    /// Failed replies are logged and discarded. `decide` sees the valid
    /// replies collected so far and may take them when it returns a result.
    /// At least `required` valid replies are needed before any decision can
    /// form; once that is out of reach the stage fails with
    /// `NodesUnavailable`. If the stage timeout elapses first the stage
    /// fails with `InsufficientQuorum`.
    pub async fn collect<'a, T, R, F, Fut, D>(
        &self,
        stage: Stage,
        endpoints: &'a [NodeEndpoint],
        required: usize,
        request: F,
        mut decide: D,
    ) -> Result<R>
    where
        F: Fn(&'a NodeEndpoint) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
        D: FnMut(&mut Vec<NodeReply<T>>) -> Option<R>,
    {
        check_quorum_size(stage, endpoints, required)?;

        let deadline = Instant::now() + self.stage_timeout;
        let mut pending: FuturesUnordered<_> = endpoints
            .iter()
            .map(|endpoint| {
                let reply = request(endpoint);
                async move { (endpoint.index, reply.await) }
            })
            .collect();

        let mut replies = Vec::with_capacity(endpoints.len());
        let mut valid = 0usize;

        loop {
            let next = match timeout_at(deadline, pending.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(%stage, valid, required, "Stage timeout elapsed");
                    return Err(Error::InsufficientQuorum {
                        stage,
                        required,
                        valid,
                    });
                }
            };
            let Some((node, result)) = next else {
                break;
            };

            match result {
                Ok(value) => {
                    valid += 1;
                    debug!(%stage, node, valid, "Valid reply");
                    replies.push(NodeReply { node, value });
                    if let Some(decision) = decide(&mut replies) {
                        debug!(%stage, valid, outstanding = pending.len(), "Quorum reached");
                        return Ok(decision);
                    }
                }
                Err(e) => discard(stage, node, &e),
            }

            if valid + pending.len() < required {
                break;
            }
        }

        warn!(%stage, valid, required, "Quorum out of reach");
        Err(Error::NodesUnavailable {
            stage,
            required,
            valid,
        })
    }

    /// Collect every valid reply the node set produces before the stage settles
    ///
    /// The stage settles when every node has answered, when the settle
    /// grace has passed since the `required`-th valid reply, or when the
    /// stage timeout elapses with at least `required` valid replies.
    /// Fewer valid replies than that fail as in `collect`.
    pub async fn collect_settled<'a, T, F, Fut>(
        &self,
        stage: Stage,
        endpoints: &'a [NodeEndpoint],
        required: usize,
        request: F,
    ) -> Result<Vec<NodeReply<T>>>
    where
        F: Fn(&'a NodeEndpoint) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        check_quorum_size(stage, endpoints, required)?;

        let mut deadline = Instant::now() + self.stage_timeout;
        let mut pending: FuturesUnordered<_> = endpoints
            .iter()
            .map(|endpoint| {
                let reply = request(endpoint);
                async move { (endpoint.index, reply.await) }
            })
            .collect();

        let mut replies = Vec::with_capacity(endpoints.len());

        loop {
            let next = match timeout_at(deadline, pending.next()).await {
                Ok(next) => next,
                Err(_) if replies.len() >= required => break,
                Err(_) => {
                    let valid = replies.len();
                    warn!(%stage, valid, required, "Stage timeout elapsed");
                    return Err(Error::InsufficientQuorum {
                        stage,
                        required,
                        valid,
                    });
                }
            };
            let Some((node, result)) = next else {
                break;
            };

            match result {
                Ok(value) => {
                    replies.push(NodeReply { node, value });
                    debug!(%stage, node, valid = replies.len(), "Valid reply");
                    if replies.len() == required {
                        deadline = deadline.min(Instant::now() + self.settle_grace);
                    }
                }
                Err(e) => discard(stage, node, &e),
            }

            if replies.len() + pending.len() < required {
                break;
            }
        }

        let valid = replies.len();
        if valid >= required {
            debug!(%stage, valid, outstanding = pending.len(), "Stage settled");
            return Ok(replies);
        }
        warn!(%stage, valid, required, "Quorum out of reach");
        Err(Error::NodesUnavailable {
            stage,
            required,
            valid,
        })
    }

    /// Collect the first `required` valid replies
    pub async fn collect_threshold<'a, T, F, Fut>(
        &self,
        stage: Stage,
        endpoints: &'a [NodeEndpoint],
        required: usize,
        request: F,
    ) -> Result<Vec<NodeReply<T>>>
    where
        F: Fn(&'a NodeEndpoint) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        self.collect(stage, endpoints, required, request, |replies| {
            (replies.len() >= required).then(|| std::mem::take(replies))
        })
        .await
    }
}

fn check_quorum_size(stage: Stage, endpoints: &[NodeEndpoint], required: usize) -> Result<()> {
    if required == 0 || required > endpoints.len() {
        return Err(Error::InvalidConfig(format!(
            "{} quorum of {} cannot be met by {} nodes",
            stage,
            required,
            endpoints.len()
        )));
    }
    Ok(())
}

fn discard(stage: Stage, node: usize, error: &Error) {
    warn!(
        %stage,
        node,
        node_local = error.is_node_local(),
        error = %error,
        "Discarding reply"
    );
}
