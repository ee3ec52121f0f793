//! Data-source seams the resolver is generic over.
//!
//! Every method returns an explicit `Result`; the resolver decides which
//! failures degrade to "no data" and which abort.

#![allow(async_fn_in_trait)]

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, Selector, B256};
use thiserror::Error;

use crate::domain::{
    LogFilter, PageParams, RawLog, RawReceipt, RawTransaction, TransactionPage,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PortError {
    /// An `eth_call` that reverted surfaces as a JSON-RPC error, not a transport failure.
    pub fn is_revert(&self) -> bool {
        match self {
            Self::Rpc { code, message } => {
                *code == 3 || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        }
    }
}

/// Raw JSON-RPC reads against a single upstream endpoint. No retries.
pub trait ChainPort {
    async fn get_code(&self, address: Address) -> Result<Bytes, PortError>;
    async fn block_number(&self) -> Result<u64, PortError>;
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, PortError>;
    async fn get_transaction(&self, hash: B256) -> Result<Option<RawTransaction>, PortError>;
    async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<RawReceipt>, PortError>;
    async fn call(
        &self,
        to: Address,
        data: &Bytes,
        from: Option<Address>,
    ) -> Result<Bytes, PortError>;
}

/// Block explorer reads. Callers treat any error as "no data".
pub trait ExplorerPort {
    /// Verified ABI as a JSON array string, `None` when the contract is unverified.
    async fn verified_abi(&self, address: Address) -> Result<Option<String>, PortError>;
    async fn transactions_to(
        &self,
        address: Address,
        page: Option<&PageParams>,
    ) -> Result<TransactionPage, PortError>;
}

/// Candidate signature texts keyed by selector / topic-0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureMatches {
    pub functions: HashMap<Selector, Vec<String>>,
    pub events: HashMap<B256, Vec<String>>,
}

impl SignatureMatches {
    pub fn function(&self, selector: &Selector) -> &[String] {
        self.functions.get(selector).map_or(&[], Vec::as_slice)
    }

    pub fn event(&self, topic: &B256) -> &[String] {
        self.events.get(topic).map_or(&[], Vec::as_slice)
    }

    pub fn merge(&mut self, other: Self) {
        for (k, v) in other.functions {
            self.functions.entry(k).or_default().extend(v);
        }
        for (k, v) in other.events {
            self.events.entry(k).or_default().extend(v);
        }
    }
}

/// 4-byte signature database.
pub trait SignaturePort {
    async fn lookup(
        &self,
        functions: &[Selector],
        events: &[B256],
    ) -> Result<SignatureMatches, PortError>;
}
