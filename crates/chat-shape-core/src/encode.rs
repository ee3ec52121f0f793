//! Calldata construction for the resolved send function.
//!
//! Only value types and the dynamic `string`/`bytes` pair are encodable.
//! Arrays and tuples are refused up front instead of guessing a layout.

use std::str::FromStr;

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{hex, Address, Bytes, Selector, B256, I256, U256};
use thiserror::Error;

use crate::domain::{ArgumentType, ContractShape};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("unsupported signature: {0}")]
    UnsupportedSignature(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("invalid {ty} argument: {reason}")]
    InvalidArgument { ty: String, reason: String },
    #[error("calldata does not match shape: {0}")]
    Mismatch(String),
}

/// `selector ++ abi_encode([message])` for a single-argument text shape.
pub fn encode_send(shape: &ContractShape, message: &str) -> Result<Bytes, EncodeError> {
    let arg_type = single_text_argument(shape)?;
    let value = match arg_type {
        ArgumentType::String => DynSolValue::String(message.to_owned()),
        ArgumentType::Bytes => DynSolValue::Bytes(message.as_bytes().to_vec()),
    };
    Ok(with_selector(
        shape.selector,
        DynSolValue::Tuple(vec![value]).abi_encode_params(),
    ))
}

/// Recover the message text from calldata built for `shape`.
pub fn decode_send(shape: &ContractShape, calldata: &[u8]) -> Result<String, EncodeError> {
    let arg_type = single_text_argument(shape)?;
    if calldata.len() < 4 || calldata[..4] != shape.selector[..] {
        return Err(EncodeError::Mismatch(format!(
            "expected selector {}",
            shape.selector
        )));
    }
    let ty = DynSolType::Tuple(vec![dyn_type_of(arg_type)]);
    let decoded = ty
        .abi_decode_params(&calldata[4..])
        .map_err(|e| EncodeError::Mismatch(format!("abi decode failed: {e}")))?;
    let first = match decoded {
        DynSolValue::Tuple(mut values) if values.len() == 1 => values.remove(0),
        other => {
            return Err(EncodeError::Mismatch(format!(
                "unexpected decoded value {other:?}"
            )))
        }
    };
    match first {
        DynSolValue::String(s) => Ok(s),
        DynSolValue::Bytes(b) => Ok(bytes_to_text(&b)),
        other => Err(EncodeError::Mismatch(format!(
            "unexpected decoded value {other:?}"
        ))),
    }
}

/// General encoding for a verified function with any number of value-type inputs.
///
/// `None` arguments encode as the type's zero value (empty for dynamic types).
pub fn encode_call(
    selector: Selector,
    types: &[String],
    args: &[Option<&str>],
) -> Result<Bytes, EncodeError> {
    if types.len() != args.len() {
        return Err(EncodeError::UnsupportedSignature(format!(
            "argument count mismatch: expected {}, got {}",
            types.len(),
            args.len()
        )));
    }
    let mut values = Vec::with_capacity(types.len());
    for (ty, arg) in types.iter().zip(args.iter()) {
        let parsed = parse_supported_type(ty)?;
        values.push(parse_value(ty, &parsed, *arg)?);
    }
    Ok(with_selector(
        selector,
        DynSolValue::Tuple(values).abi_encode_params(),
    ))
}

/// UTF-8 text when valid, otherwise 0x-prefixed hex.
pub fn bytes_to_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => format!("0x{}", hex::encode(bytes)),
    }
}

fn single_text_argument(shape: &ContractShape) -> Result<ArgumentType, EncodeError> {
    if shape.inputs.len() != 1 {
        return Err(EncodeError::UnsupportedSignature(format!(
            "{} takes {} arguments, expected exactly one",
            shape.method_call(),
            shape.inputs.len()
        )));
    }
    ArgumentType::from_abi(&shape.inputs[0]).ok_or_else(|| {
        EncodeError::UnsupportedSignature(format!(
            "{} takes {}, expected string or bytes",
            shape.method_call(),
            shape.inputs[0]
        ))
    })
}

fn dyn_type_of(arg_type: ArgumentType) -> DynSolType {
    match arg_type {
        ArgumentType::String => DynSolType::String,
        ArgumentType::Bytes => DynSolType::Bytes,
    }
}

fn with_selector(selector: Selector, params: Vec<u8>) -> Bytes {
    let mut out = Vec::with_capacity(4 + params.len());
    out.extend_from_slice(selector.as_slice());
    out.extend_from_slice(&params);
    Bytes::from(out)
}

pub(crate) fn parse_supported_type(ty: &str) -> Result<DynSolType, EncodeError> {
    let parsed: DynSolType = ty
        .trim()
        .parse()
        .map_err(|e| EncodeError::UnsupportedType(format!("{ty}: {e}")))?;
    match parsed {
        DynSolType::Bool
        | DynSolType::Int(_)
        | DynSolType::Uint(_)
        | DynSolType::FixedBytes(_)
        | DynSolType::Address
        | DynSolType::Bytes
        | DynSolType::String => Ok(parsed),
        _ => Err(EncodeError::UnsupportedType(ty.to_owned())),
    }
}

fn invalid(ty: &str, reason: impl std::fmt::Display) -> EncodeError {
    EncodeError::InvalidArgument {
        ty: ty.to_owned(),
        reason: reason.to_string(),
    }
}

fn parse_value(ty: &str, parsed: &DynSolType, arg: Option<&str>) -> Result<DynSolValue, EncodeError> {
    let arg = arg.map(str::trim);
    match parsed {
        DynSolType::Bool => match arg {
            None | Some("false") | Some("0") => Ok(DynSolValue::Bool(false)),
            Some("true") | Some("1") => Ok(DynSolValue::Bool(true)),
            Some(other) => Err(invalid(ty, format!("expected bool, got '{other}'"))),
        },
        DynSolType::Uint(bits) => {
            let value = match arg {
                None => U256::ZERO,
                Some(s) => U256::from_str(s).map_err(|e| invalid(ty, e))?,
            };
            Ok(DynSolValue::Uint(value, *bits))
        }
        DynSolType::Int(bits) => {
            let value = match arg {
                None => I256::ZERO,
                Some(s) => I256::from_str(s).map_err(|e| invalid(ty, e))?,
            };
            Ok(DynSolValue::Int(value, *bits))
        }
        DynSolType::Address => {
            let value = match arg {
                None => Address::ZERO,
                Some(s) => Address::from_str(s).map_err(|e| invalid(ty, e))?,
            };
            Ok(DynSolValue::Address(value))
        }
        DynSolType::FixedBytes(size) => {
            let mut word = B256::ZERO;
            if let Some(s) = arg {
                let raw = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| invalid(ty, e))?;
                if raw.len() > *size {
                    return Err(invalid(ty, format!("{} bytes exceed {size}", raw.len())));
                }
                word[..raw.len()].copy_from_slice(&raw);
            }
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Bytes => {
            let value = match arg {
                None => Vec::new(),
                Some(s) => match s.strip_prefix("0x").map(hex::decode) {
                    Some(Ok(raw)) => raw,
                    _ => s.as_bytes().to_vec(),
                },
            };
            Ok(DynSolValue::Bytes(value))
        }
        DynSolType::String => Ok(DynSolValue::String(arg.unwrap_or_default().to_owned())),
        _ => Err(EncodeError::UnsupportedType(ty.to_owned())),
    }
}
