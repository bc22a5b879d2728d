use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;
use txwatch_domain::model::BlockView;

use crate::worker::MonitorError;

mod types;

pub use types::{
    parse_quantity, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcBlock, RpcTransaction,
};

/// Chain data the monitor depends on.
#[async_trait]
pub trait ChainSource: Send + Sync {
    async fn head_block_number(&self) -> Result<u64, MonitorError>;

    /// Fetches a block with full transaction bodies. `Ok(None)` means the
    /// source has not indexed this number yet, which is distinct from a hard
    /// error.
    async fn fetch_block(&self, number: u64) -> Result<Option<BlockView>, MonitorError>;
}

/// Plain HTTP JSON-RPC client with a bounded per-request timeout.
pub struct RpcChainSource {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcChainSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, MonitorError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T>(&self, method: &'static str, params: Value) -> Result<Option<T>, MonitorError>
    where
        T: DeserializeOwned,
    {
        let result = self.call_inner(method, params).await;
        let tag = if result.is_ok() { "ok" } else { "error" };
        counter!("monitor_rpc_calls_total", "call" => method, "result" => tag).increment(1);
        result
    }

    async fn call_inner<T>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<Option<T>, MonitorError>
    where
        T: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let response = self.http.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::Rpc(format!("{method} returned HTTP {status}")));
        }

        let body: JsonRpcResponse<T> = response
            .json()
            .await
            .map_err(|err| MonitorError::Decode(format!("{method}: {err}")))?;
        if let Some(err) = body.error {
            return Err(MonitorError::Rpc(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }
        Ok(body.result)
    }
}

#[async_trait]
impl ChainSource for RpcChainSource {
    async fn head_block_number(&self) -> Result<u64, MonitorError> {
        let raw: String = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| MonitorError::Decode("eth_blockNumber returned no result".into()))?;
        parse_quantity(&raw)
    }

    async fn fetch_block(&self, number: u64) -> Result<Option<BlockView>, MonitorError> {
        let raw: Option<RpcBlock> = self
            .call("eth_getBlockByNumber", json!([format!("0x{number:x}"), true]))
            .await?;
        let Some(raw) = raw else {
            debug!(block_number = number, "eth_getBlockByNumber returned null");
            return Ok(None);
        };
        raw.into_view(number).map(Some)
    }
}
