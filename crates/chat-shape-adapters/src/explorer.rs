//! Blockscout explorer client: verified ABI and decoded transaction history.

use alloy::primitives::{Address, Bytes, B256};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use chat_shape_core::{
    DecodedCall, DecodedParam, ExplorerPort, ExplorerTransaction, PageParams, PortError,
    TransactionPage,
};

use crate::AdapterConfig;

#[derive(Debug, Clone)]
pub struct BlockscoutAdapter {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SmartContractResponse {
    abi: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyAbiResponse {
    result: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireTransactionPage {
    #[serde(default)]
    items: Vec<WireTransaction>,
    next_page_params: Option<PageParams>,
}

#[derive(Debug, Deserialize)]
struct WireAddressRef {
    hash: Address,
}

#[derive(Debug, Deserialize)]
struct WireTransaction {
    hash: Option<B256>,
    from: Option<WireAddressRef>,
    timestamp: Option<String>,
    raw_input: Option<Bytes>,
    method_id: Option<String>,
    decoded_input: Option<WireDecodedInput>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireDecodedInput {
    #[serde(default)]
    method_call: String,
    method_id: Option<String>,
    #[serde(default)]
    parameters: Vec<WireParam>,
}

#[derive(Debug, Deserialize)]
struct WireParam {
    name: Option<String>,
    #[serde(rename = "type", default)]
    ty: String,
    #[serde(default)]
    value: Value,
}

impl From<WireTransaction> for ExplorerTransaction {
    fn from(w: WireTransaction) -> Self {
        let method_id = w
            .method_id
            .or_else(|| w.decoded_input.as_ref().and_then(|d| d.method_id.clone()));
        Self {
            hash: w.hash,
            from: w.from.map(|f| f.hash),
            timestamp: w.timestamp,
            raw_input: w.raw_input,
            method_id,
            decoded: w.decoded_input.map(|d| DecodedCall {
                method_call: d.method_call,
                parameters: d
                    .parameters
                    .into_iter()
                    .map(|p| DecodedParam {
                        name: p.name,
                        ty: p.ty,
                        value: p.value,
                    })
                    .collect(),
            }),
            status: w.status,
        }
    }
}

impl BlockscoutAdapter {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            client,
        }
    }

    pub fn with_config(config: &AdapterConfig) -> Result<Self, PortError> {
        Ok(Self::new(config.explorer_base_url.clone(), config.http_client()?))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<T, PortError> {
        let response = self
            .client
            .get(url)
            .header("accept", "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| PortError::Transport(format!("explorer request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PortError::Transport(format!("explorer status {status}")));
        }
        response
            .json()
            .await
            .map_err(|e| PortError::Decode(format!("explorer json decode failed: {e}")))
    }
}

/// ABI JSON array text, whether the explorer sent it as a string or inline.
fn abi_text(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if s.trim_start().starts_with('[') => Some(s),
        v @ Value::Array(_) => Some(v.to_string()),
        _ => None,
    }
}

impl ExplorerPort for BlockscoutAdapter {
    async fn verified_abi(&self, address: Address) -> Result<Option<String>, PortError> {
        let v2 = format!("{}/api/v2/smart-contracts/{address}", self.base_url);
        match self.get_json::<SmartContractResponse>(&v2, &[]).await {
            Ok(body) => {
                if let Some(abi) = abi_text(body.abi) {
                    return Ok(Some(abi));
                }
                debug!(%address, "no abi on v2 endpoint");
            }
            Err(e) => debug!(%address, error = %e, "v2 smart-contract lookup failed"),
        }

        let legacy = format!("{}/api", self.base_url);
        let query = [
            ("module".to_owned(), "contract".to_owned()),
            ("action".to_owned(), "getabi".to_owned()),
            ("address".to_owned(), address.to_string()),
        ];
        match self.get_json::<LegacyAbiResponse>(&legacy, &query).await {
            Ok(body) => Ok(abi_text(body.result)),
            Err(e) => {
                warn!(%address, error = %e, "legacy getabi failed");
                Err(e)
            }
        }
    }

    async fn transactions_to(
        &self,
        address: Address,
        page: Option<&PageParams>,
    ) -> Result<TransactionPage, PortError> {
        let url = format!("{}/api/v2/addresses/{address}/transactions", self.base_url);
        let mut query = vec![("filter".to_owned(), "to".to_owned())];
        if let Some(page) = page {
            query.extend(page.query_pairs());
        }
        let wire: WireTransactionPage = self.get_json(&url, &query).await?;
        debug!(count = wire.items.len(), "explorer transactions page");
        Ok(TransactionPage {
            items: wire.items.into_iter().map(ExplorerTransaction::from).collect(),
            next_page_params: wire.next_page_params.filter(|p| !p.0.is_empty()),
        })
    }
}
