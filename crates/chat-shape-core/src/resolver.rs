//! Contract shape resolution.
//!
//! Strict waterfall, each stage tried only when the previous one produced
//! nothing usable:
//!
//! 1. verified ABI from the explorer
//! 2. selector frequency among explorer-decoded single-text-argument calls
//! 3. bytecode PUSH4 scan + signature database + optional `eth_call` probe
//! 4. raw log mining over plain JSON-RPC
//!
//! Source failures never abort resolution; they are logged and treated as
//! "no data". Only exhausting every stage yields [`ShapeError::ShapeUnavailable`].
//!
//! Results depend on live chain and explorer state, so two resolutions a few
//! blocks apart can legitimately pick different selectors.

use alloy::primitives::{Address, Selector, B256, U256};
use futures::future::join_all;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::abi::{text_position, ContractAbi};
use crate::domain::{
    ArgumentType, ContractShape, EventLayout, ExplorerTransaction, LogFilter, RawLog,
    ShapeSource, SignatureCandidate, SignatureKind,
};
use crate::encode::encode_call;
use crate::ports::{ChainPort, ExplorerPort, SignatureMatches, SignaturePort};
use crate::scoring::{rank, synthesize_event_params, Scorer, CHAT_VOCABULARY};
use crate::selectors::extract_selectors_from_bytes;
use crate::signature::parse_text_sig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("no send function found")]
    NoSendFunctionFound,
    #[error("no message event found")]
    NoMessageEventFound,
    #[error("no candidate found by {0}")]
    NoCandidateFound(&'static str),
    #[error("contract shape unavailable: every resolution stage came up empty")]
    ShapeUnavailable,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub vocabulary: Vec<String>,
    /// Bytecode selectors sent to the signature database.
    pub max_bytecode_selectors: usize,
    /// Selectors per signature database request.
    pub lookup_chunk_size: usize,
    pub probe_candidates: bool,
    pub max_probe_candidates: usize,
    pub probe_from: Option<Address>,
    pub probe_message: String,
    pub log_window_blocks: u64,
    pub min_log_window_blocks: u64,
    pub max_log_scan_tries: usize,
    /// Most frequent topic-0 values sent to the signature database.
    pub max_event_topics: usize,
    pub max_mined_transactions: usize,
    /// Attach an event layout to shapes found without one.
    pub infer_events: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            vocabulary: CHAT_VOCABULARY.iter().map(|s| (*s).to_owned()).collect(),
            max_bytecode_selectors: 120,
            lookup_chunk_size: 24,
            probe_candidates: true,
            max_probe_candidates: 12,
            probe_from: None,
            probe_message: "gm".to_owned(),
            log_window_blocks: 5_000,
            min_log_window_blocks: 500,
            max_log_scan_tries: 8,
            max_event_topics: 8,
            max_mined_transactions: 25,
            infer_events: true,
        }
    }
}

/// Outcome of a read-only dry run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Accepted,
    Reverted,
    Inconclusive,
}

pub struct Resolver<C, E, S>
where
    C: ChainPort,
    E: ExplorerPort,
    S: SignaturePort,
{
    pub chain: C,
    pub explorer: E,
    pub signatures: S,
    config: ResolverConfig,
    scorer: Scorer,
}

impl<C, E, S> Resolver<C, E, S>
where
    C: ChainPort,
    E: ExplorerPort,
    S: SignaturePort,
{
    pub fn new(chain: C, explorer: E, signatures: S, config: ResolverConfig) -> Self {
        let scorer = Scorer::new(config.vocabulary.clone());
        Self {
            chain,
            explorer,
            signatures,
            config,
            scorer,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub async fn resolve_shape(&self, contract: Address) -> Result<ContractShape, ShapeError> {
        info!(%contract, "resolving contract shape");

        match self.from_verified_abi(contract).await {
            Ok(shape) => {
                info!(selector = %shape.selector, function = %shape.function_name, "resolved from verified abi");
                return Ok(shape);
            }
            Err(e) => debug!(error = %e, "verified abi stage empty"),
        }

        let mut logs: Option<Vec<RawLog>> = None;
        let mut shape = match self.from_decoded_transactions(contract).await {
            Ok(shape) => Some(shape),
            Err(e) => {
                debug!(error = %e, "decoded transaction stage empty");
                None
            }
        };
        if shape.is_none() {
            shape = match self.from_bytecode(contract).await {
                Ok(shape) => Some(shape),
                Err(e) => {
                    debug!(error = %e, "bytecode stage empty");
                    None
                }
            };
        }
        if shape.is_none() {
            let mined = self.scan_logs(contract).await;
            shape = match self.from_logs(contract, &mined).await {
                Ok(shape) => Some(shape),
                Err(e) => {
                    debug!(error = %e, "log mining stage empty");
                    None
                }
            };
            logs = Some(mined);
        }

        let Some(mut shape) = shape else {
            warn!(%contract, "contract shape unavailable");
            return Err(ShapeError::ShapeUnavailable);
        };

        if shape.event.is_none()
            && self.config.infer_events
            && shape.source != ShapeSource::LogMining
        {
            let logs = match logs {
                Some(logs) => logs,
                None => self.scan_logs(contract).await,
            };
            match self.infer_event(&logs).await {
                Ok(layout) => shape.event = Some(layout),
                Err(e) => debug!(error = %e, "no event layout attached"),
            }
        }

        info!(
            selector = %shape.selector,
            function = %shape.function_name,
            source = ?shape.source,
            "resolved contract shape"
        );
        Ok(shape)
    }

    async fn from_verified_abi(&self, contract: Address) -> Result<ContractShape, ShapeError> {
        const STAGE: &str = "verified abi";
        let json = match self.explorer.verified_abi(contract).await {
            Ok(Some(json)) => json,
            Ok(None) => return Err(ShapeError::NoCandidateFound(STAGE)),
            Err(e) => {
                warn!(error = %e, "explorer abi lookup failed");
                return Err(ShapeError::NoCandidateFound(STAGE));
            }
        };
        let abi = ContractAbi::parse(&json).map_err(|e| {
            warn!(error = %e, "verified abi is not valid json abi");
            ShapeError::NoCandidateFound(STAGE)
        })?;
        select_from_abi(&abi, contract, &self.scorer)
    }

    async fn from_decoded_transactions(
        &self,
        contract: Address,
    ) -> Result<ContractShape, ShapeError> {
        let page = match self.explorer.transactions_to(contract, None).await {
            Ok(page) => page,
            Err(e) => {
                warn!(error = %e, "explorer transaction list failed");
                return Err(ShapeError::NoCandidateFound("decoded transactions"));
            }
        };
        debug!(count = page.items.len(), "explorer transactions fetched");
        select_from_decoded(&page.items, contract)
    }

    async fn from_bytecode(&self, contract: Address) -> Result<ContractShape, ShapeError> {
        const STAGE: &str = "bytecode scan";
        let code = match self.chain.get_code(contract).await {
            Ok(code) => code,
            Err(e) => {
                warn!(error = %e, "eth_getCode failed");
                return Err(ShapeError::NoCandidateFound(STAGE));
            }
        };
        let mut selectors = extract_selectors_from_bytes(&code);
        selectors.truncate(self.config.max_bytecode_selectors);
        debug!(count = selectors.len(), "bytecode selectors extracted");
        if selectors.is_empty() {
            return Err(ShapeError::NoCandidateFound(STAGE));
        }

        let matches = self.lookup_functions(&selectors).await;
        let candidates = function_candidates(&selectors, &matches, &self.scorer);
        debug!(count = candidates.len(), "text-argument candidates");
        let mut sendable = candidates.iter().filter_map(|candidate| {
            shape_from_candidate(contract, candidate, ShapeSource::BytecodeProbe)
                .filter(ContractShape::is_sendable)
                .map(|shape| (candidate, shape))
        });

        if !self.config.probe_candidates {
            return sendable
                .next()
                .map(|(_, shape)| shape)
                .ok_or(ShapeError::NoCandidateFound(STAGE));
        }

        let mut untested: Option<ContractShape> = None;
        for (candidate, shape) in sendable.take(self.config.max_probe_candidates) {
            match self.probe(contract, candidate).await {
                Probe::Accepted => {
                    debug!(signature = %candidate.signature.text, "probe accepted");
                    return Ok(shape);
                }
                Probe::Reverted => {
                    debug!(signature = %candidate.signature.text, "probe reverted")
                }
                Probe::Inconclusive => {
                    debug!(signature = %candidate.signature.text, "probe inconclusive");
                    untested.get_or_insert(shape);
                }
            }
        }
        match untested {
            Some(shape) => {
                warn!(function = %shape.function_name, "no dry run succeeded, using best candidate that did not revert");
                Ok(shape)
            }
            None => Err(ShapeError::NoCandidateFound(STAGE)),
        }
    }

    async fn from_logs(
        &self,
        contract: Address,
        logs: &[RawLog],
    ) -> Result<ContractShape, ShapeError> {
        const STAGE: &str = "log mining";
        if logs.is_empty() {
            return Err(ShapeError::NoCandidateFound(STAGE));
        }

        let mut hashes: Vec<B256> = Vec::new();
        for hash in logs.iter().filter_map(|l| l.transaction_hash) {
            if !hashes.contains(&hash) {
                hashes.push(hash);
            }
        }
        hashes.truncate(self.config.max_mined_transactions);

        let mut tally: Vec<(Selector, ArgumentType, usize)> = Vec::new();
        for hash in hashes {
            let tx = match self.chain.get_transaction(hash).await {
                Ok(Some(tx)) => tx,
                Ok(None) => continue,
                Err(e) => {
                    debug!(%hash, error = %e, "eth_getTransactionByHash failed");
                    continue;
                }
            };
            if tx.to != Some(contract) || tx.input.len() < 4 {
                continue;
            }
            let Some(arg_type) = single_dynamic_argument(&tx.input[4..]) else {
                continue;
            };
            let selector = Selector::from_slice(&tx.input[..4]);
            match tally.iter_mut().find(|(s, _, _)| *s == selector) {
                Some(entry) => entry.2 += 1,
                None => tally.push((selector, arg_type, 1)),
            }
        }

        let Some((selector, argument_type)) = first_max(&tally, |e| e.2).map(|e| (e.0, e.1))
        else {
            return Err(ShapeError::NoCandidateFound(STAGE));
        };

        let function_name = self.name_for_selector(selector, argument_type).await;
        let mut shape = ContractShape {
            contract,
            selector,
            function_name,
            inputs: vec![argument_type.as_str().to_owned()],
            argument_type,
            event: None,
            source: ShapeSource::LogMining,
        };
        if self.config.infer_events {
            shape.event = self.infer_event(logs).await.ok();
        }
        Ok(shape)
    }

    /// Walk back from the head in fixed windows until some log shows up.
    ///
    /// A failing window is retried at half the size; never errors.
    pub async fn scan_logs(&self, contract: Address) -> Vec<RawLog> {
        let latest = match self.chain.block_number().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "eth_blockNumber failed");
                return Vec::new();
            }
        };
        let min_window = self.config.min_log_window_blocks.max(1);
        let mut window = self.config.log_window_blocks.max(min_window);
        let mut to = latest;
        for attempt in 0..self.config.max_log_scan_tries {
            let from = to.saturating_sub(window);
            let filter = LogFilter {
                address: contract,
                from_block: from,
                to_block: to,
                topic0: None,
            };
            match self.chain.get_logs(&filter).await {
                Ok(logs) if !logs.is_empty() => {
                    debug!(attempt, from, to, count = logs.len(), "logs found");
                    return logs;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(attempt, from, to, error = %e, "eth_getLogs failed, shrinking window");
                    window = (window / 2).max(min_window);
                    continue;
                }
            }
            if from == 0 {
                break;
            }
            to = from - 1;
        }
        Vec::new()
    }

    async fn infer_event(&self, logs: &[RawLog]) -> Result<EventLayout, ShapeError> {
        let mut topics: Vec<(B256, usize, usize)> = Vec::new();
        for log in logs {
            let Some(topic0) = log.topics.first() else {
                continue;
            };
            match topics.iter_mut().find(|(t, _, _)| t == topic0) {
                Some(entry) => entry.1 += 1,
                None => topics.push((*topic0, 1, log.topics.len())),
            }
        }
        if topics.is_empty() {
            return Err(ShapeError::NoMessageEventFound);
        }
        topics.sort_by(|a, b| b.1.cmp(&a.1));
        topics.truncate(self.config.max_event_topics);

        let wanted: Vec<B256> = topics.iter().map(|t| t.0).collect();
        let matches = match self.signatures.lookup(&[], &wanted).await {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "event signature lookup failed");
                return Err(ShapeError::NoMessageEventFound);
            }
        };
        select_event(&topics, &matches, &self.scorer)
    }

    async fn lookup_functions(&self, selectors: &[Selector]) -> SignatureMatches {
        let chunk = self.config.lookup_chunk_size.max(1);
        let batches = selectors
            .chunks(chunk)
            .map(|batch| self.signatures.lookup(batch, &[]));
        let mut merged = SignatureMatches::default();
        for result in join_all(batches).await {
            match result {
                Ok(found) => merged.merge(found),
                Err(e) => warn!(error = %e, "signature lookup batch failed"),
            }
        }
        merged
    }

    async fn name_for_selector(&self, selector: Selector, argument_type: ArgumentType) -> String {
        let matches = match self.signatures.lookup(&[selector], &[]).await {
            Ok(m) => m,
            Err(e) => {
                debug!(%selector, error = %e, "selector name lookup failed");
                return "unknown".to_owned();
            }
        };
        matches
            .function(&selector)
            .iter()
            .filter_map(|text| parse_text_sig(text))
            .find(|sig| sig.types.len() == 1 && sig.types[0] == argument_type.as_str())
            .map(|sig| sig.name)
            .unwrap_or_else(|| "unknown".to_owned())
    }

    async fn probe(&self, contract: Address, candidate: &SignatureCandidate) -> Probe {
        let Ok(selector) = candidate.key.parse::<Selector>() else {
            return Probe::Inconclusive;
        };
        let types = &candidate.signature.types;
        let message_at = text_position(types);
        let args: Vec<Option<&str>> = (0..types.len())
            .map(|i| (Some(i) == message_at).then_some(self.config.probe_message.as_str()))
            .collect();
        let data = match encode_call(selector, types, &args) {
            Ok(data) => data,
            Err(e) => {
                debug!(signature = %candidate.signature.text, error = %e, "cannot synthesize probe");
                return Probe::Inconclusive;
            }
        };
        match self.chain.call(contract, &data, self.config.probe_from).await {
            Ok(_) => Probe::Accepted,
            Err(e) if e.is_revert() => Probe::Reverted,
            Err(_) => Probe::Inconclusive,
        }
    }
}

/// Best send function and message event from a verified ABI.
pub fn select_from_abi(
    abi: &ContractAbi,
    contract: Address,
    scorer: &Scorer,
) -> Result<ContractShape, ShapeError> {
    let senders: Vec<_> = abi
        .functions()
        .filter(|f| !f.is_read_only() && f.single_dynamic_input().is_some())
        .collect();
    let function = first_max(&senders, |f| scorer.score_function_name(&f.name))
        .copied()
        .ok_or(ShapeError::NoSendFunctionFound)?;

    let events: Vec<_> = abi.events().filter(|e| e.has_text_input()).collect();
    let event = first_max(&events, |e| scorer.score_event_name(&e.name))
        .copied()
        .ok_or(ShapeError::NoMessageEventFound)?;

    let argument_type = function
        .single_dynamic_input()
        .ok_or(ShapeError::NoSendFunctionFound)?;
    Ok(ContractShape {
        contract,
        selector: function.selector(),
        function_name: function.name.clone(),
        inputs: function.inputs.iter().map(|p| p.ty.clone()).collect(),
        argument_type,
        event: Some(event.layout()),
        source: ShapeSource::VerifiedAbi,
    })
}

/// Most frequent selector among calls the explorer decoded as one text argument.
///
/// Frequency is counted over the filtered calls only, so busy unrelated
/// functions on the same contract cannot outvote the chat call.
pub fn select_from_decoded(
    txs: &[ExplorerTransaction],
    contract: Address,
) -> Result<ContractShape, ShapeError> {
    struct Seen {
        selector: Selector,
        argument_type: ArgumentType,
        name: String,
        count: usize,
    }

    let mut seen: Vec<Seen> = Vec::new();
    for tx in txs {
        let Some(call) = &tx.decoded else { continue };
        let [param] = call.parameters.as_slice() else {
            continue;
        };
        let Some(argument_type) = ArgumentType::from_abi(&param.ty) else {
            continue;
        };
        let Some(selector) = tx.selector() else {
            continue;
        };
        match seen.iter_mut().find(|s| s.selector == selector) {
            Some(entry) => entry.count += 1,
            None => seen.push(Seen {
                selector,
                argument_type,
                name: crate::signature::parse_method_call(&call.method_call).name,
                count: 1,
            }),
        }
    }

    let best = first_max(&seen, |s| s.count)
        .ok_or(ShapeError::NoCandidateFound("decoded transactions"))?;
    Ok(ContractShape {
        contract,
        selector: best.selector,
        function_name: best.name.clone(),
        inputs: vec![best.argument_type.as_str().to_owned()],
        argument_type: best.argument_type,
        event: None,
        source: ShapeSource::DecodedTransactions,
    })
}

/// Function signatures with at least one text parameter, ranked by name score.
pub fn function_candidates(
    selectors: &[Selector],
    matches: &SignatureMatches,
    scorer: &Scorer,
) -> Vec<SignatureCandidate> {
    let mut out: Vec<SignatureCandidate> = selectors
        .iter()
        .flat_map(|selector| {
            matches
                .function(selector)
                .iter()
                .filter_map(move |text| parse_text_sig(text).map(|sig| (*selector, sig)))
        })
        .filter(|(_, sig)| sig.dynamic_count() >= 1)
        .map(|(selector, sig)| SignatureCandidate {
            key: selector.to_string(),
            kind: SignatureKind::Function,
            score: scorer.score_function_name(&sig.name),
            signature: sig,
        })
        .collect();
    rank(&mut out);
    out
}

/// Pick the message event among looked-up topics.
///
/// `topics` holds `(topic0, count, sample topics length)` in frequency order.
pub fn select_event(
    topics: &[(B256, usize, usize)],
    matches: &SignatureMatches,
    scorer: &Scorer,
) -> Result<EventLayout, ShapeError> {
    let mut candidates: Vec<(SignatureCandidate, B256, usize)> = Vec::new();
    for (topic0, _, topics_len) in topics {
        let indexed = topics_len.saturating_sub(1);
        for text in matches.event(topic0) {
            let Some(sig) = parse_text_sig(text) else {
                continue;
            };
            if sig.types.is_empty() || sig.types.len() < indexed || sig.dynamic_count() == 0 {
                continue;
            }
            candidates.push((
                SignatureCandidate {
                    key: topic0.to_string(),
                    kind: SignatureKind::Event,
                    score: scorer.score_event_name(&sig.name),
                    signature: sig,
                },
                *topic0,
                *topics_len,
            ));
        }
    }
    candidates.sort_by(|a, b| b.0.score.cmp(&a.0.score));
    let (candidate, topic0, topics_len) = candidates
        .into_iter()
        .next()
        .ok_or(ShapeError::NoMessageEventFound)?;

    let types = candidate.signature.types;
    let params = synthesize_event_params(&types, topics_len);
    Ok(EventLayout {
        name: candidate.signature.name,
        signature_hash: topic0,
        text_index: params.iter().position(|p| p.name == "message"),
        sender_index: params.iter().position(|p| p.name == "from"),
        params,
    })
}

fn shape_from_candidate(
    contract: Address,
    candidate: &SignatureCandidate,
    source: ShapeSource,
) -> Option<ContractShape> {
    let selector = candidate.key.parse::<Selector>().ok()?;
    let types = &candidate.signature.types;
    let argument_type = ArgumentType::from_abi(&types[text_position(types)?])?;
    Some(ContractShape {
        contract,
        selector,
        function_name: candidate.signature.name.clone(),
        inputs: types.clone(),
        argument_type,
        event: None,
        source,
    })
}

/// Whether a call payload (selector stripped) is exactly one ABI-encoded
/// dynamic value, and if so whether it reads as text.
pub fn single_dynamic_argument(payload: &[u8]) -> Option<ArgumentType> {
    if payload.len() < 64 {
        return None;
    }
    let offset = word_to_usize(&payload[0..32])?;
    if offset != 32 {
        return None;
    }
    let length = word_to_usize(&payload[32..64])?;
    let padded = length.checked_add(31)? / 32 * 32;
    let end = padded.checked_add(64)?;
    if payload.len() != end {
        return None;
    }
    let data = &payload[64..64 + length];
    Some(match std::str::from_utf8(data) {
        Ok(_) => ArgumentType::String,
        Err(_) => ArgumentType::Bytes,
    })
}

fn word_to_usize(word: &[u8]) -> Option<usize> {
    let value = U256::from_be_slice(word);
    u64::try_from(value).ok().and_then(|v| usize::try_from(v).ok())
}

/// First element with the highest key; later equal keys never win.
fn first_max<T, K: Ord>(items: &[T], key: impl Fn(&T) -> K) -> Option<&T> {
    let mut best: Option<(&T, K)> = None;
    for item in items {
        let k = key(item);
        match &best {
            Some((_, current)) if *current >= k => {}
            _ => best = Some((item, k)),
        }
    }
    best.map(|(item, _)| item)
}
