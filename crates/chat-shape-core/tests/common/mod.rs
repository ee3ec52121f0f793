#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, Selector, B256};

use chat_shape_core::{
    ChainPort, DecodedCall, DecodedParam, ExplorerPort, ExplorerTransaction, LogFilter,
    PageParams, PortError, RawLog, RawReceipt, RawTransaction, Resolver, ResolverConfig,
    SignatureMatches, SignaturePort, TransactionPage,
};

pub fn contract() -> Address {
    "0xD4f66cBFA345C18Afc928a48f470566729bEEcA5"
        .parse()
        .expect("valid contract address")
}

pub fn sender() -> Address {
    "0x1000000000000000000000000000000000000001"
        .parse()
        .expect("valid sender address")
}

pub fn selector(hex: &str) -> Selector {
    hex.parse().expect("valid selector")
}

/// `selector ++ abi.encode(message)` built independently of the crate under test.
pub fn text_calldata(sel: Selector, message: &str) -> Bytes {
    let mut out = sel.to_vec();
    out.extend(DynSolValue::Tuple(vec![DynSolValue::String(message.to_owned())]).abi_encode_params());
    Bytes::from(out)
}

#[derive(Debug, Default)]
pub struct FakeChain {
    pub code: Bytes,
    pub latest: u64,
    pub logs: Vec<RawLog>,
    pub txs: HashMap<B256, RawTransaction>,
    /// Selectors whose `eth_call` reverts.
    pub reverting: Vec<Selector>,
    /// `eth_getLogs` errors when the range is wider than this.
    pub max_log_range: Option<u64>,
    pub fail_all: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeChain {
    fn record(&self, what: String) -> Result<(), PortError> {
        if let Ok(mut g) = self.calls.lock() {
            g.push(what);
        }
        if self.fail_all {
            return Err(PortError::Transport("connection refused".to_owned()));
        }
        Ok(())
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl ChainPort for FakeChain {
    async fn get_code(&self, _address: Address) -> Result<Bytes, PortError> {
        self.record("eth_getCode".to_owned())?;
        Ok(self.code.clone())
    }

    async fn block_number(&self) -> Result<u64, PortError> {
        self.record("eth_blockNumber".to_owned())?;
        Ok(self.latest)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, PortError> {
        self.record(format!("eth_getLogs {}-{}", filter.from_block, filter.to_block))?;
        if let Some(max) = self.max_log_range {
            if filter.to_block - filter.from_block > max {
                return Err(PortError::Rpc {
                    code: -32005,
                    message: "query returned more than 10000 results".to_owned(),
                });
            }
        }
        Ok(self
            .logs
            .iter()
            .filter(|l| {
                let block = l.block_number.unwrap_or_default();
                block >= filter.from_block && block <= filter.to_block
            })
            .filter(|l| filter.topic0.map_or(true, |t| l.topics.first() == Some(&t)))
            .cloned()
            .collect())
    }

    async fn get_transaction(&self, hash: B256) -> Result<Option<RawTransaction>, PortError> {
        self.record("eth_getTransactionByHash".to_owned())?;
        Ok(self.txs.get(&hash).cloned())
    }

    async fn get_transaction_receipt(&self, _hash: B256) -> Result<Option<RawReceipt>, PortError> {
        self.record("eth_getTransactionReceipt".to_owned())?;
        Ok(None)
    }

    async fn call(
        &self,
        _to: Address,
        data: &Bytes,
        _from: Option<Address>,
    ) -> Result<Bytes, PortError> {
        self.record("eth_call".to_owned())?;
        let sel = Selector::from_slice(&data[..4]);
        if self.reverting.contains(&sel) {
            return Err(PortError::Rpc {
                code: 3,
                message: "execution reverted".to_owned(),
            });
        }
        Ok(Bytes::new())
    }
}

#[derive(Debug, Default)]
pub struct FakeExplorer {
    pub abi: Option<String>,
    pub txs: Vec<ExplorerTransaction>,
    pub fail_all: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeExplorer {
    pub fn count(&self, name: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|c| c.as_str() == name)
            .count()
    }
}

impl ExplorerPort for FakeExplorer {
    async fn verified_abi(&self, _address: Address) -> Result<Option<String>, PortError> {
        self.calls.lock().expect("calls lock").push("abi".to_owned());
        if self.fail_all {
            return Err(PortError::Transport("explorer down".to_owned()));
        }
        Ok(self.abi.clone())
    }

    async fn transactions_to(
        &self,
        _address: Address,
        _page: Option<&PageParams>,
    ) -> Result<TransactionPage, PortError> {
        self.calls.lock().expect("calls lock").push("transactions".to_owned());
        if self.fail_all {
            return Err(PortError::Transport("explorer down".to_owned()));
        }
        Ok(TransactionPage {
            items: self.txs.clone(),
            next_page_params: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct FakeSignatures {
    pub functions: HashMap<Selector, Vec<String>>,
    pub events: HashMap<B256, Vec<String>>,
    pub fail_all: bool,
    pub requests: Mutex<usize>,
}

impl SignaturePort for FakeSignatures {
    async fn lookup(
        &self,
        functions: &[Selector],
        events: &[B256],
    ) -> Result<SignatureMatches, PortError> {
        *self.requests.lock().expect("requests lock") += 1;
        if self.fail_all {
            return Err(PortError::Transport("sigdb down".to_owned()));
        }
        let mut out = SignatureMatches::default();
        for f in functions {
            if let Some(found) = self.functions.get(f) {
                out.functions.insert(*f, found.clone());
            }
        }
        for e in events {
            if let Some(found) = self.events.get(e) {
                out.events.insert(*e, found.clone());
            }
        }
        Ok(out)
    }
}

pub type TestResolver = Resolver<FakeChain, FakeExplorer, FakeSignatures>;

pub fn resolver(chain: FakeChain, explorer: FakeExplorer, signatures: FakeSignatures) -> TestResolver {
    Resolver::new(chain, explorer, signatures, ResolverConfig::default())
}

pub fn decoded_tx(sel: Selector, method_call: &str, params: Vec<(&str, serde_json::Value)>) -> ExplorerTransaction {
    ExplorerTransaction {
        hash: Some(B256::repeat_byte(0x11)),
        from: Some(sender()),
        timestamp: Some("2025-01-02T03:04:05.000000Z".to_owned()),
        raw_input: Some(Bytes::from(sel.to_vec())),
        method_id: Some(sel.to_string()),
        decoded: Some(DecodedCall {
            method_call: method_call.to_owned(),
            parameters: params
                .into_iter()
                .map(|(ty, value)| DecodedParam {
                    name: None,
                    ty: ty.to_owned(),
                    value,
                })
                .collect(),
        }),
        status: Some("ok".to_owned()),
    }
}
