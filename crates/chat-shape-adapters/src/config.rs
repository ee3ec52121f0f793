use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::{address, Address};
use chat_shape_core::PortError;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub rpc_url: String,
    pub explorer_base_url: String,
    pub signature_db_url: String,
    pub tx_explorer_base_url: String,
    pub contract: Address,
    pub http_timeout_ms: u64,
    /// Latency below which the RPC counts as healthy.
    pub health_green_ms: u64,
    pub signature_cache_enabled: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.base.org".to_owned(),
            explorer_base_url: "https://base.blockscout.com".to_owned(),
            signature_db_url: "https://api.4byte.sourcify.dev/signature-database/v1/lookup"
                .to_owned(),
            tx_explorer_base_url: "https://basescan.org".to_owned(),
            contract: address!("D4f66cBFA345C18Afc928a48f470566729bEEcA5"),
            http_timeout_ms: 15_000,
            health_green_ms: 900,
            signature_cache_enabled: false,
        }
    }
}

impl AdapterConfig {
    /// Defaults overridden by `CHAT_SHAPE_*` environment variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_string("CHAT_SHAPE_RPC_URL") {
            cfg.rpc_url = v;
        }
        if let Some(v) = env_string("CHAT_SHAPE_EXPLORER_URL") {
            cfg.explorer_base_url = v;
        }
        if let Some(v) = env_string("CHAT_SHAPE_SIGNATURE_DB_URL") {
            cfg.signature_db_url = v;
        }
        if let Some(v) = env_string("CHAT_SHAPE_TX_EXPLORER_URL") {
            cfg.tx_explorer_base_url = v;
        }
        if let Some(v) = env_parse("CHAT_SHAPE_CONTRACT") {
            cfg.contract = v;
        }
        if let Some(v) = env_parse("CHAT_SHAPE_HTTP_TIMEOUT_MS") {
            cfg.http_timeout_ms = v;
        }
        if let Some(v) = env_parse("CHAT_SHAPE_HEALTH_GREEN_MS") {
            cfg.health_green_ms = v;
        }
        if let Some(v) = env_parse("CHAT_SHAPE_SIGNATURE_CACHE") {
            cfg.signature_cache_enabled = v;
        }
        cfg
    }

    /// Block explorer page for a transaction, `None` unless `hash` is 0x-prefixed.
    pub fn tx_url(&self, hash: &str) -> Option<String> {
        let hash = hash.trim();
        if hash.len() <= 2 || !hash.starts_with("0x") {
            return None;
        }
        Some(format!(
            "{}/tx/{hash}",
            self.tx_explorer_base_url.trim_end_matches('/')
        ))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn http_client(&self) -> Result<reqwest::Client, PortError> {
        reqwest::Client::builder()
            .timeout(self.http_timeout())
            .build()
            .map_err(|e| PortError::Transport(format!("failed to build http client: {e}")))
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Option<T>
where
    T::Err: std::fmt::Display,
{
    let raw = env_string(key)?;
    match raw.parse::<T>() {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "ignoring invalid environment override");
            None
        }
    }
}
