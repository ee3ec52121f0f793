use serde::Serialize;
use tracing::debug;
use web_time::Instant;

use chat_shape_core::ChainPort;

use crate::RpcAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcHealth {
    pub status: HealthStatus,
    pub rpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Time one `eth_blockNumber` round trip.
pub async fn probe_health(rpc: &RpcAdapter, green_below_ms: u64) -> RpcHealth {
    let started = Instant::now();
    let result = rpc.block_number().await;
    let ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(block_number) => RpcHealth {
            status: if ms < green_below_ms {
                HealthStatus::Green
            } else {
                HealthStatus::Yellow
            },
            rpc: rpc.url().to_owned(),
            block_number: Some(block_number),
            ms: Some(ms),
            note: None,
        },
        Err(e) => {
            debug!(rpc = rpc.url(), error = %e, "rpc health probe failed");
            RpcHealth {
                status: HealthStatus::Red,
                rpc: rpc.url().to_owned(),
                block_number: None,
                ms: None,
                note: Some("RPC unreachable".to_owned()),
            }
        }
    }
}
