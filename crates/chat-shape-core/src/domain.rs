use alloy::primitives::{keccak256, Address, Bytes, Selector, B256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimestampMs(pub u64);

/// Encoding of the single dynamic message parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    String,
    Bytes,
}

impl ArgumentType {
    /// Maps an ABI type name onto a message encoding, `None` for anything that
    /// cannot carry free-form text.
    pub fn from_abi(ty: &str) -> Option<Self> {
        match ty.trim() {
            "string" => Some(Self::String),
            "bytes" => Some(Self::Bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Bytes => "bytes",
        }
    }
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which waterfall stage produced a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeSource {
    VerifiedAbi,
    DecodedTransactions,
    BytecodeProbe,
    LogMining,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub indexed: bool,
}

/// Decoding metadata for the "message posted" log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLayout {
    pub name: String,
    pub signature_hash: B256,
    pub params: Vec<EventParam>,
    /// Position of the text-bearing parameter.
    pub text_index: Option<usize>,
    /// Position of the sender-address parameter.
    pub sender_index: Option<usize>,
}

impl EventLayout {
    pub fn indexed_count(&self) -> usize {
        self.params.iter().filter(|p| p.indexed).count()
    }

    pub fn canonical_signature(&self) -> String {
        let types: Vec<&str> = self.params.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

/// Resolved description of how to talk to the chat contract.
///
/// Built fresh by every resolution and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractShape {
    pub contract: Address,
    pub selector: Selector,
    pub function_name: String,
    /// Every declared input of the chosen function, in order.
    pub inputs: Vec<String>,
    pub argument_type: ArgumentType,
    pub event: Option<EventLayout>,
    pub source: ShapeSource,
}

impl ContractShape {
    pub fn event_signature_hash(&self) -> Option<B256> {
        self.event.as_ref().map(|e| e.signature_hash)
    }

    pub fn event_argument_layout(&self) -> Option<&[EventParam]> {
        self.event.as_ref().map(|e| e.params.as_slice())
    }

    /// True when `encode_send` can build calldata for this shape.
    pub fn is_sendable(&self) -> bool {
        self.inputs.len() == 1 && ArgumentType::from_abi(&self.inputs[0]).is_some()
    }

    /// True when raw logs can be decoded into messages.
    pub fn is_decodable(&self) -> bool {
        self.event
            .as_ref()
            .map_or(false, |e| e.text_index.is_some())
    }

    pub fn method_call(&self) -> String {
        format!("{}({})", self.function_name, self.inputs.join(","))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureKind {
    Function,
    Event,
}

/// Parsed `name(type1,type2,...)` signature text. Parameter names are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSignature {
    pub name: String,
    pub types: Vec<String>,
    pub text: String,
}

impl TextSignature {
    pub fn canonical(&self) -> String {
        format!("{}({})", self.name, self.types.join(","))
    }

    pub fn dynamic_count(&self) -> usize {
        self.types
            .iter()
            .filter(|t| ArgumentType::from_abi(t).is_some())
            .count()
    }
}

/// A signature database match with its provenance and plausibility score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureCandidate {
    /// Selector (functions) or topic-0 (events) the database matched, 0x-prefixed.
    pub key: String,
    pub kind: SignatureKind,
    pub signature: TextSignature,
    pub score: i32,
}

// --- Chain data ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub address: Address,
    pub from_block: u64,
    pub to_block: u64,
    pub topic0: Option<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawLog {
    pub address: Option<Address>,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: Option<u64>,
    pub transaction_hash: Option<B256>,
    pub log_index: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub hash: B256,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawReceipt {
    pub transaction_hash: B256,
    pub succeeded: Option<bool>,
    pub logs: Vec<RawLog>,
}

// --- Explorer data ---

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParam {
    pub name: Option<String>,
    pub ty: String,
    pub value: Value,
}

/// Call the explorer decoded on our behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedCall {
    pub method_call: String,
    pub parameters: Vec<DecodedParam>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExplorerTransaction {
    pub hash: Option<B256>,
    pub from: Option<Address>,
    pub timestamp: Option<String>,
    pub raw_input: Option<Bytes>,
    pub method_id: Option<String>,
    pub decoded: Option<DecodedCall>,
    pub status: Option<String>,
}

impl ExplorerTransaction {
    /// Selector from the raw calldata, falling back to the explorer's method id.
    pub fn selector(&self) -> Option<Selector> {
        if let Some(input) = &self.raw_input {
            if input.len() >= 4 {
                return Some(Selector::from_slice(&input[..4]));
            }
        }
        self.method_id
            .as_deref()
            .and_then(|id| parse_selector(id))
    }

    pub fn failed(&self) -> bool {
        self.status.as_deref() == Some("error")
    }
}

/// Opaque explorer pagination cursor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageParams(pub Map<String, Value>);

impl PageParams {
    /// Flattens the cursor into query pairs, the way the explorer expects it back.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransactionPage {
    pub items: Vec<ExplorerTransaction>,
    pub next_page_params: Option<PageParams>,
}

// --- Messages ---

/// A `{from, text}` pair recovered from chain or explorer data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedMessage {
    pub from: Option<Address>,
    pub text: String,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
    pub timestamp: Option<String>,
    pub failed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Feed entry handed to the rendering layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub created_at: TimestampMs,
    pub from: String,
    pub text: String,
    pub status: TxStatus,
    pub tx_hash: Option<B256>,
    pub log_index: Option<u64>,
}

impl ChatMessage {
    pub fn confirmed(decoded: &DecodedMessage) -> Self {
        let id = match (decoded.tx_hash, decoded.log_index) {
            (Some(hash), Some(index)) => format!("{hash}:{index}"),
            (Some(hash), None) => hash.to_string(),
            (None, _) => format!("msg:{}", keccak256(decoded.text.as_bytes())),
        };
        let created_at = decoded
            .timestamp
            .as_deref()
            .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| TimestampMs(dt.timestamp_millis().max(0) as u64))
            .unwrap_or(TimestampMs(0));
        Self {
            id,
            created_at,
            from: decoded.from.map(|a| a.to_string()).unwrap_or_default(),
            text: decoded.text.clone(),
            status: if decoded.failed {
                TxStatus::Failed
            } else {
                TxStatus::Confirmed
            },
            tx_hash: decoded.tx_hash,
            log_index: decoded.log_index,
        }
    }

    /// Optimistic entry shown while the wallet call is in flight.
    pub fn pending(call_id: &str, from: Address, text: &str, now: TimestampMs) -> Self {
        Self {
            id: format!("local:{call_id}"),
            created_at: now,
            from: from.to_string(),
            text: text.to_owned(),
            status: TxStatus::Pending,
            tx_hash: None,
            log_index: None,
        }
    }
}

/// Normalizes `0xA9059CBB` / `a9059cbb` into a selector.
pub fn parse_selector(text: &str) -> Option<Selector> {
    let hex_part = text.trim();
    let hex_part = hex_part.strip_prefix("0x").unwrap_or(hex_part);
    if hex_part.len() != 8 {
        return None;
    }
    let bytes = alloy::primitives::hex::decode(hex_part).ok()?;
    Some(Selector::from_slice(&bytes))
}
