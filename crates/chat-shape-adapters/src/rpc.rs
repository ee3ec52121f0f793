//! Plain JSON-RPC chain client.

use std::sync::atomic::{AtomicU64, Ordering};

use alloy::primitives::{Address, Bytes, B256};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use chat_shape_core::{ChainPort, LogFilter, PortError, RawLog, RawReceipt, RawTransaction};

use crate::AdapterConfig;

#[derive(Debug)]
pub struct RpcAdapter {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireLog {
    address: Option<Address>,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    block_number: Option<String>,
    transaction_hash: Option<B256>,
    log_index: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: B256,
    from: Address,
    to: Option<Address>,
    #[serde(default)]
    input: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireReceipt {
    transaction_hash: B256,
    status: Option<String>,
    #[serde(default)]
    logs: Vec<WireLog>,
}

impl From<WireLog> for RawLog {
    fn from(w: WireLog) -> Self {
        Self {
            address: w.address,
            topics: w.topics,
            data: w.data,
            block_number: w.block_number.as_deref().and_then(|q| parse_quantity(q).ok()),
            transaction_hash: w.transaction_hash,
            log_index: w.log_index.as_deref().and_then(|q| parse_quantity(q).ok()),
        }
    }
}

impl From<WireTransaction> for RawTransaction {
    fn from(w: WireTransaction) -> Self {
        Self {
            hash: w.hash,
            from: w.from,
            to: w.to,
            input: w.input,
        }
    }
}

impl From<WireReceipt> for RawReceipt {
    fn from(w: WireReceipt) -> Self {
        Self {
            transaction_hash: w.transaction_hash,
            succeeded: w
                .status
                .as_deref()
                .and_then(|s| parse_quantity(s).ok())
                .map(|s| s == 1),
            logs: w.logs.into_iter().map(RawLog::from).collect(),
        }
    }
}

impl RpcAdapter {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_config(config: &AdapterConfig) -> Result<Self, PortError> {
        Ok(Self::new(config.rpc_url.clone(), config.http_client()?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, PortError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(method, id, "rpc request");
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("{method} request failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PortError::Transport(format!("{method} body read failed: {e}")))?;
        let envelope: RpcEnvelope = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(e) if status.is_success() => {
                return Err(PortError::Decode(format!("{method} bad response: {e}")))
            }
            Err(_) => return Err(PortError::Transport(format!("{method} http status {status}"))),
        };
        if let Some(err) = envelope.error {
            return Err(PortError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(envelope.result)
            .map_err(|e| PortError::Decode(format!("{method} result: {e}")))
    }
}

impl ChainPort for RpcAdapter {
    async fn get_code(&self, address: Address) -> Result<Bytes, PortError> {
        self.request("eth_getCode", json!([address, "latest"])).await
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        let quantity: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&quantity)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, PortError> {
        let mut body = json!({
            "address": filter.address,
            "fromBlock": to_quantity(filter.from_block),
            "toBlock": to_quantity(filter.to_block),
        });
        if let Some(topic0) = filter.topic0 {
            body["topics"] = json!([topic0]);
        }
        let logs: Vec<WireLog> = self.request("eth_getLogs", json!([body])).await?;
        Ok(logs.into_iter().map(RawLog::from).collect())
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<RawTransaction>, PortError> {
        let tx: Option<WireTransaction> = self
            .request("eth_getTransactionByHash", json!([hash]))
            .await?;
        Ok(tx.map(RawTransaction::from))
    }

    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>, PortError> {
        let receipt: Option<WireReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash]))
            .await?;
        Ok(receipt.map(RawReceipt::from))
    }

    async fn call(
        &self,
        to: Address,
        data: &Bytes,
        from: Option<Address>,
    ) -> Result<Bytes, PortError> {
        let mut tx = json!({ "to": to, "data": data });
        if let Some(from) = from {
            tx["from"] = json!(from);
        }
        self.request("eth_call", json!([tx, "latest"])).await
    }
}

pub fn parse_quantity(quantity: &str) -> Result<u64, PortError> {
    let q = quantity.trim();
    let digits = q.strip_prefix("0x").unwrap_or(q);
    if digits.is_empty() {
        return Err(PortError::Decode(format!("empty quantity '{quantity}'")));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| PortError::Decode(format!("invalid quantity '{quantity}': {e}")))
}

pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}
