//! Recover `{from, text}` pairs from explorer records and raw logs.
//!
//! Anything that does not yield text is dropped; partial logs are normal.

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{hex, Address, B256};
use serde_json::Value;
use tracing::debug;

use crate::domain::{ContractShape, DecodedCall, DecodedMessage, EventLayout, ExplorerTransaction, RawLog};
use crate::encode::{bytes_to_text, decode_send};

/// Input to [`decode`].
#[derive(Debug, Clone, Copy)]
pub enum MessageSource<'a> {
    Transactions(&'a [ExplorerTransaction]),
    Logs(&'a [RawLog]),
}

pub fn decode(shape: &ContractShape, source: MessageSource<'_>) -> Vec<DecodedMessage> {
    match source {
        MessageSource::Transactions(txs) => decode_transactions(Some(shape), txs),
        MessageSource::Logs(logs) => shape
            .event
            .as_ref()
            .map(|layout| decode_logs(layout, logs))
            .unwrap_or_default(),
    }
}

/// Decode explorer transactions. With a shape, calls to other selectors are
/// skipped and undecoded calldata is parsed with the shape.
pub fn decode_transactions(
    shape: Option<&ContractShape>,
    txs: &[ExplorerTransaction],
) -> Vec<DecodedMessage> {
    txs.iter()
        .filter_map(|tx| {
            if let (Some(shape), Some(selector)) = (shape, tx.selector()) {
                if selector != shape.selector {
                    return None;
                }
            }
            let text = tx
                .decoded
                .as_ref()
                .and_then(extract_message)
                .or_else(|| {
                    let shape = shape?;
                    let input = tx.raw_input.as_ref()?;
                    decode_send(shape, input).ok()
                })
                .filter(|t| !t.is_empty())?;
            Some(DecodedMessage {
                from: tx.from,
                text,
                tx_hash: tx.hash,
                log_index: None,
                timestamp: tx.timestamp.clone(),
                failed: tx.failed(),
            })
        })
        .collect()
}

/// Prefer a `string` parameter, then a `bytes` one (UTF-8 when possible),
/// then the first parameter if it is textual.
pub fn extract_message(call: &DecodedCall) -> Option<String> {
    let params = &call.parameters;
    if let Some(s) = params
        .iter()
        .find_map(|p| (p.ty == "string").then(|| p.value.as_str()).flatten())
    {
        return Some(s.to_owned());
    }
    if let Some(v) = params
        .iter()
        .find_map(|p| (p.ty == "bytes").then(|| p.value.as_str()).flatten())
    {
        return Some(hex_to_text(v));
    }
    match params.first().map(|p| &p.value) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

fn hex_to_text(value: &str) -> String {
    match value.strip_prefix("0x") {
        Some(h) => match hex::decode(h) {
            Ok(raw) if !raw.is_empty() => match std::str::from_utf8(&raw) {
                Ok(text) => text.to_owned(),
                Err(_) => value.to_owned(),
            },
            _ => value.to_owned(),
        },
        None => value.to_owned(),
    }
}

/// Decode logs matching `layout`, mapping topics and data words back to params.
pub fn decode_logs(layout: &EventLayout, logs: &[RawLog]) -> Vec<DecodedMessage> {
    let Some(text_index) = layout.text_index else {
        return Vec::new();
    };
    logs.iter()
        .filter_map(|log| {
            let values = match decode_log_values(layout, log) {
                Some(v) => v,
                None => {
                    debug!(tx = ?log.transaction_hash, "skipping undecodable log");
                    return None;
                }
            };
            let text = match values.get(text_index)? {
                LogValue::Decoded(DynSolValue::String(s)) => s.clone(),
                LogValue::Decoded(DynSolValue::Bytes(b)) => bytes_to_text(b),
                _ => return None,
            };
            if text.is_empty() {
                return None;
            }
            let from = layout
                .sender_index
                .and_then(|i| values.get(i))
                .and_then(|v| match v {
                    LogValue::Decoded(DynSolValue::Address(a)) => Some(*a),
                    _ => None,
                });
            Some(DecodedMessage {
                from,
                text,
                tx_hash: log.transaction_hash,
                log_index: log.log_index,
                timestamp: None,
                failed: false,
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
enum LogValue {
    Decoded(DynSolValue),
    /// Indexed dynamic value; only its hash is on chain.
    Hashed(B256),
}

fn decode_log_values(layout: &EventLayout, log: &RawLog) -> Option<Vec<LogValue>> {
    let (topic0, indexed_topics) = log.topics.split_first()?;
    if *topic0 != layout.signature_hash || indexed_topics.len() != layout.indexed_count() {
        return None;
    }

    let types: Vec<DynSolType> = layout
        .params
        .iter()
        .map(|p| p.ty.parse::<DynSolType>().ok())
        .collect::<Option<_>>()?;

    let data_types: Vec<DynSolType> = layout
        .params
        .iter()
        .zip(types.iter())
        .filter(|(p, _)| !p.indexed)
        .map(|(_, t)| t.clone())
        .collect();
    let mut data_values = if data_types.is_empty() {
        Vec::new()
    } else {
        match DynSolType::Tuple(data_types).abi_decode_params(&log.data).ok()? {
            DynSolValue::Tuple(values) => values,
            _ => return None,
        }
    }
    .into_iter();

    let mut topics = indexed_topics.iter();
    let mut out = Vec::with_capacity(layout.params.len());
    for (param, ty) in layout.params.iter().zip(types.iter()) {
        if param.indexed {
            let topic = *topics.next()?;
            out.push(decode_topic(ty, topic));
        } else {
            out.push(LogValue::Decoded(data_values.next()?));
        }
    }
    Some(out)
}

fn decode_topic(ty: &DynSolType, topic: B256) -> LogValue {
    match ty {
        DynSolType::Address => LogValue::Decoded(DynSolValue::Address(Address::from_word(topic))),
        t if is_reference_type(t) => LogValue::Hashed(topic),
        t => match t.abi_decode(topic.as_slice()) {
            Ok(v) => LogValue::Decoded(v),
            Err(_) => LogValue::Hashed(topic),
        },
    }
}

/// Indexed values of these types are stored as their keccak hash.
fn is_reference_type(ty: &DynSolType) -> bool {
    matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DecodedParam;
    use serde_json::json;

    fn call(params: Vec<(&str, Value)>) -> DecodedCall {
        DecodedCall {
            method_call: "x()".to_owned(),
            parameters: params
                .into_iter()
                .map(|(ty, value)| DecodedParam {
                    name: None,
                    ty: ty.to_owned(),
                    value,
                })
                .collect(),
        }
    }

    #[test]
    fn test_prefers_string_param() {
        let c = call(vec![("bytes", json!("0x6869")), ("string", json!("gm"))]);
        assert_eq!(extract_message(&c).as_deref(), Some("gm"));
    }

    #[test]
    fn test_bytes_param_utf8_or_hex() {
        let c = call(vec![("bytes", json!("0x6869"))]);
        assert_eq!(extract_message(&c).as_deref(), Some("hi"));
        let c = call(vec![("bytes", json!("0xfffe"))]);
        assert_eq!(extract_message(&c).as_deref(), Some("0xfffe"));
    }

    #[test]
    fn test_first_param_fallback() {
        let c = call(vec![("uint256", json!("42"))]);
        assert_eq!(extract_message(&c).as_deref(), Some("42"));
        let c = call(vec![("bool", json!(true))]);
        assert_eq!(extract_message(&c), None);
    }

    #[test]
    fn test_skips_string_param_without_text_value() {
        let c = call(vec![
            ("string", Value::Null),
            ("string", json!("second")),
            ("bytes", json!("0x6869")),
        ]);
        assert_eq!(extract_message(&c).as_deref(), Some("second"));

        let c = call(vec![("bytes", Value::Null), ("bytes", json!("0x6869"))]);
        assert_eq!(extract_message(&c).as_deref(), Some("hi"));
    }

    #[test]
    fn test_indexed_reference_types_stay_hashed() {
        let topic = B256::repeat_byte(0x11);
        for ty in [
            DynSolType::String,
            DynSolType::Bytes,
            DynSolType::Array(Box::new(DynSolType::Address)),
            DynSolType::Tuple(vec![DynSolType::Bool]),
        ] {
            assert!(matches!(decode_topic(&ty, topic), LogValue::Hashed(h) if h == topic));
        }

        let mut word = [0u8; 32];
        word[31] = 7;
        match decode_topic(&DynSolType::Uint(256), B256::from(word)) {
            LogValue::Decoded(DynSolValue::Uint(v, 256)) => assert_eq!(v.to::<u64>(), 7),
            other => panic!("unexpected {other:?}"),
        }
    }
}
