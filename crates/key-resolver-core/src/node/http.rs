//! JSON-RPC 2.0 over HTTP node transport

use super::{
    AssignAck, AssignRequest, CommitmentAck, CommitmentRequest, LookupRequest, LookupResponse,
    NodeTransport, RpcMethod, ShareRequest, ShareResponse, Signed, async_trait,
};
use crate::types::NodeEndpoint;
use crate::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::debug;

/// Posts JSON-RPC requests to each node's URL
#[derive(Debug, Clone)]
pub struct HttpNodeTransport {
    client: reqwest::Client,
}

impl HttpNodeTransport {
    /// Create a transport whose requests time out after `request_timeout`
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn call<P, T>(&self, endpoint: &NodeEndpoint, method: RpcMethod, params: &P) -> Result<T>
    where
        P: Serialize + Sync,
        T: DeserializeOwned,
    {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method.as_str(),
            "params": params,
            "id": 10
        });

        debug!(node = endpoint.index, method = method.as_str(), "Sending node request");
        let response = self
            .client
            .post(&endpoint.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                Error::Transport(format!("Node {} request failed: {}", endpoint.index, e))
            })?;

        let response_body: serde_json::Value = response.json().await.map_err(|e| {
            Error::invalid_response(endpoint.index, format!("Unparseable reply: {}", e))
        })?;

        if let Some(error) = response_body.get("error") {
            return Err(Error::invalid_response(
                endpoint.index,
                format!("RPC error: {}", error),
            ));
        }

        let result = response_body
            .get("result")
            .ok_or_else(|| Error::invalid_response(endpoint.index, "Missing result in RPC reply"))?;

        serde_json::from_value(result.clone()).map_err(|e| {
            Error::invalid_response(endpoint.index, format!("Malformed result: {}", e))
        })
    }
}

#[async_trait]
impl NodeTransport for HttpNodeTransport {
    async fn lookup(
        &self,
        endpoint: &NodeEndpoint,
        request: &LookupRequest,
    ) -> Result<Signed<LookupResponse>> {
        self.call(endpoint, RpcMethod::Lookup, request).await
    }

    async fn assign(
        &self,
        endpoint: &NodeEndpoint,
        request: &AssignRequest,
    ) -> Result<Signed<AssignAck>> {
        self.call(endpoint, RpcMethod::Assign, request).await
    }

    async fn commitment(
        &self,
        endpoint: &NodeEndpoint,
        request: &CommitmentRequest,
    ) -> Result<Signed<CommitmentAck>> {
        self.call(endpoint, RpcMethod::Commitment, request).await
    }

    async fn share(
        &self,
        endpoint: &NodeEndpoint,
        request: &ShareRequest,
    ) -> Result<Signed<ShareResponse>> {
        self.call(endpoint, RpcMethod::Share, request).await
    }
}
