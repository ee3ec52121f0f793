//! Paged message history for the chat view.

use alloy::primitives::Address;
use tracing::debug;

use crate::decode::{decode_logs, decode_transactions};
use crate::domain::{ChatMessage, ContractShape, LogFilter, PageParams};
use crate::ports::{ChainPort, ExplorerPort, PortError};

pub const DEFAULT_FEED_LIMIT: usize = 15;
pub const MIN_FEED_LIMIT: usize = 5;
pub const MAX_FEED_LIMIT: usize = 50;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedRequest {
    pub limit: Option<usize>,
    pub page: Option<PageParams>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub items: Vec<ChatMessage>,
    pub next_page_params: Option<PageParams>,
}

pub fn clamp_limit(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_FEED_LIMIT)
        .clamp(MIN_FEED_LIMIT, MAX_FEED_LIMIT)
}

/// One page of explorer transactions sent to `contract`, decoded into messages.
///
/// The limit applies before decoding, so a page can hold fewer messages than
/// requested when some calls carry no text.
pub async fn fetch_feed<E: ExplorerPort>(
    explorer: &E,
    contract: Address,
    shape: Option<&ContractShape>,
    request: &FeedRequest,
) -> Result<FeedPage, PortError> {
    let limit = clamp_limit(request.limit);
    let page = explorer
        .transactions_to(contract, request.page.as_ref())
        .await?;
    let window = &page.items[..page.items.len().min(limit)];
    let items: Vec<ChatMessage> = decode_transactions(shape, window)
        .iter()
        .map(ChatMessage::confirmed)
        .collect();
    debug!(fetched = page.items.len(), decoded = items.len(), "feed page");
    Ok(FeedPage {
        items,
        next_page_params: page.next_page_params,
    })
}

/// Messages from the shape's event logs over the last `blocks` blocks.
pub async fn fetch_log_messages<C: ChainPort>(
    chain: &C,
    shape: &ContractShape,
    blocks: u64,
) -> Result<Vec<ChatMessage>, PortError> {
    let Some(layout) = shape.event.as_ref() else {
        return Ok(Vec::new());
    };
    let latest = chain.block_number().await?;
    let filter = LogFilter {
        address: shape.contract,
        from_block: latest.saturating_sub(blocks),
        to_block: latest,
        topic0: Some(layout.signature_hash),
    };
    let logs = chain.get_logs(&filter).await?;
    Ok(decode_logs(layout, &logs)
        .iter()
        .map(ChatMessage::confirmed)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(None), 15);
        assert_eq!(clamp_limit(Some(1)), 5);
        assert_eq!(clamp_limit(Some(20)), 20);
        assert_eq!(clamp_limit(Some(500)), 50);
    }
}
