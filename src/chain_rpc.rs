use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{MeshgateError, Result};

static HEX_RESULT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0x[0-9a-fA-F]*$").expect("regex"));

fn normalize_rpc_result(value: Value, method: &str) -> Result<Value> {
    if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
        return Err(MeshgateError::Rpc(format!("{method} error: {error}")));
    }

    value
        .get("result")
        .cloned()
        .ok_or_else(|| MeshgateError::Rpc(format!("{method} missing result")))
}

/// Read-only JSON-RPC access to an EVM chain endpoint.
#[derive(Clone)]
pub struct ChainRpc {
    endpoint: String,
    http: reqwest::Client,
    timeout: Duration,
}

impl ChainRpc {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let endpoint = endpoint.trim();
        if endpoint.is_empty() {
            return Err(MeshgateError::Config("rpc_url must be configured".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MeshgateError::Http(format!("failed to build rpc client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            http,
            timeout,
        })
    }

    pub async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let call = async {
            let response = self
                .http
                .post(&self.endpoint)
                .json(&request)
                .send()
                .await
                .map_err(|e| MeshgateError::Http(format!("rpc {method} transport failure: {e}")))?;

            let status = response.status();
            if !status.is_success() {
                return Err(MeshgateError::Http(format!("rpc {method} http {status}")));
            }
            response
                .json::<Value>()
                .await
                .map_err(|e| MeshgateError::Rpc(format!("{method} decode failure: {e}")))
        };

        let body = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| {
                MeshgateError::Http(format!("rpc {method} timed out after {:?}", self.timeout))
            })??;

        normalize_rpc_result(body, method)
    }

    /// `eth_call` at the latest block; returns the raw `0x` hex result.
    pub async fn eth_call(&self, to: &str, data: &str) -> Result<String> {
        debug!(to = %to, selector = %data.get(..10).unwrap_or(data), "eth_call");
        let result = self
            .rpc_call("eth_call", json!([{"to": to, "data": data}, "latest"]))
            .await?;
        let hex = result
            .as_str()
            .ok_or_else(|| MeshgateError::Rpc(format!("eth_call returned non-string result: {result}")))?;
        if !HEX_RESULT_RE.is_match(hex) {
            return Err(MeshgateError::Rpc(format!("eth_call returned invalid hex: {hex}")));
        }
        Ok(hex.to_string())
    }
}
