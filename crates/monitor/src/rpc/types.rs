// Wire types for the Ethereum JSON-RPC endpoint plus their conversion into the
// domain views the pipeline works on.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use txwatch_domain::model::{Address, BlockView, TransactionView};

use crate::worker::MonitorError;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    // `null` for blocks the node has not indexed yet.
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// `eth_getBlockByNumber` payload requested with full transaction bodies.
#[derive(Debug, Deserialize)]
pub struct RpcBlock {
    #[serde(default)]
    pub number: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    /// `null` for contract creation.
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl RpcBlock {
    pub fn into_view(self, requested: u64) -> Result<BlockView, MonitorError> {
        let number = match self.number.as_deref() {
            Some(raw) => parse_quantity(raw)?,
            None => requested,
        };
        let timestamp = match self.timestamp.as_deref() {
            Some(raw) => {
                let secs = i64::try_from(parse_quantity(raw)?)
                    .map_err(|_| MonitorError::Decode(format!("timestamp overflow: {raw}")))?;
                DateTime::from_timestamp(secs, 0)
            }
            None => None,
        };
        let transactions = self
            .transactions
            .into_iter()
            .map(RpcTransaction::into_view)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BlockView {
            number,
            timestamp,
            transactions,
        })
    }
}

impl RpcTransaction {
    pub fn into_view(self) -> Result<TransactionView, MonitorError> {
        let from = parse_address(&self.from)?;
        let to = self.to.as_deref().map(parse_address).transpose()?;
        let input = match self.input.as_deref() {
            Some(raw) => parse_bytes(raw)?,
            None => Vec::new(),
        };
        let value = match self.value.as_deref() {
            Some(raw) => parse_quantity_u128(raw)?,
            None => 0,
        };

        Ok(TransactionView {
            hash: self.hash.to_ascii_lowercase(),
            from,
            to,
            input,
            value,
        })
    }
}

fn strip_hex_prefix(raw: &str) -> &str {
    raw.strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw)
}

pub fn parse_quantity(raw: &str) -> Result<u64, MonitorError> {
    let digits = strip_hex_prefix(raw.trim());
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|err| MonitorError::Decode(format!("invalid quantity `{raw}`: {err}")))
}

fn parse_quantity_u128(raw: &str) -> Result<u128, MonitorError> {
    let digits = strip_hex_prefix(raw.trim());
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|err| MonitorError::Decode(format!("invalid quantity `{raw}`: {err}")))
}

fn parse_bytes(raw: &str) -> Result<Vec<u8>, MonitorError> {
    hex::decode(strip_hex_prefix(raw.trim()))
        .map_err(|err| MonitorError::Decode(format!("invalid call input: {err}")))
}

fn parse_address(raw: &str) -> Result<Address, MonitorError> {
    Address::parse(raw).map_err(|err| MonitorError::Decode(format!("invalid address `{raw}`: {err}")))
}
