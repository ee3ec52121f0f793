//! Minimal JSON ABI model for verified contracts.
//!
//! Only functions and events matter here; declaration order is preserved so
//! scoring ties resolve the same way the ABI lists them.

use serde::Deserialize;

use crate::domain::{ArgumentType, EventLayout, EventParam};
use crate::signature::{event_topic, function_selector};
use alloy::primitives::Selector;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub indexed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiFunction {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub state_mutability: String,
}

impl AbiFunction {
    pub fn is_read_only(&self) -> bool {
        matches!(self.state_mutability.as_str(), "view" | "pure")
    }

    pub fn canonical_signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    pub fn selector(&self) -> Selector {
        function_selector(&self.canonical_signature())
    }

    /// The sole input's message encoding when this is a one-argument text call.
    pub fn single_dynamic_input(&self) -> Option<ArgumentType> {
        match self.inputs.as_slice() {
            [only] => ArgumentType::from_abi(&only.ty),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiEvent {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub anonymous: bool,
}

impl AbiEvent {
    pub fn canonical_signature(&self) -> String {
        let types: Vec<&str> = self.inputs.iter().map(|p| p.ty.as_str()).collect();
        format!("{}({})", self.name, types.join(","))
    }

    pub fn has_text_input(&self) -> bool {
        self.inputs
            .iter()
            .any(|p| ArgumentType::from_abi(&p.ty).is_some())
    }

    /// Layout with the declared indexed flags, which are authoritative here.
    pub fn layout(&self) -> EventLayout {
        let params: Vec<EventParam> = self
            .inputs
            .iter()
            .enumerate()
            .map(|(i, p)| EventParam {
                name: if p.name.is_empty() {
                    format!("arg{i}")
                } else {
                    p.name.clone()
                },
                ty: p.ty.clone(),
                indexed: p.indexed,
            })
            .collect();
        let types: Vec<String> = params.iter().map(|p| p.ty.clone()).collect();
        EventLayout {
            name: self.name.clone(),
            signature_hash: event_topic(&self.canonical_signature()),
            text_index: text_position(&types),
            sender_index: types.iter().position(|t| t == "address"),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiItem {
    Function(AbiFunction),
    Event(AbiEvent),
    Other,
}

/// Wire shape of one ABI entry; `type` defaults to `function` per the JSON ABI spec.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAbiEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default)]
    state_mutability: Option<String>,
    #[serde(default)]
    constant: bool,
    #[serde(default)]
    anonymous: bool,
}

impl From<RawAbiEntry> for AbiItem {
    fn from(raw: RawAbiEntry) -> Self {
        match raw.kind.as_deref().unwrap_or("function") {
            "function" => {
                let legacy = if raw.constant { "view" } else { "nonpayable" };
                let state_mutability = raw
                    .state_mutability
                    .unwrap_or_else(|| legacy.to_owned());
                Self::Function(AbiFunction {
                    name: raw.name,
                    inputs: raw.inputs,
                    state_mutability,
                })
            }
            "event" => Self::Event(AbiEvent {
                name: raw.name,
                inputs: raw.inputs,
                anonymous: raw.anonymous,
            }),
            _ => Self::Other,
        }
    }
}

/// Parsed ABI in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAbi {
    pub items: Vec<AbiItem>,
}

impl ContractAbi {
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let raw: Vec<RawAbiEntry> = serde_json::from_str(json)?;
        Ok(Self {
            items: raw.into_iter().map(AbiItem::from).collect(),
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &AbiFunction> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Function(f) => Some(f),
            _ => None,
        })
    }

    pub fn events(&self) -> impl Iterator<Item = &AbiEvent> {
        self.items.iter().filter_map(|item| match item {
            AbiItem::Event(e) => Some(e),
            _ => None,
        })
    }

    pub fn function_by_selector(&self, selector: &Selector) -> Option<&AbiFunction> {
        self.functions().find(|f| &f.selector() == selector)
    }
}

/// First `string`, else first `bytes`.
pub(crate) fn text_position(types: &[String]) -> Option<usize> {
    types
        .iter()
        .position(|t| t == "string")
        .or_else(|| types.iter().position(|t| t == "bytes"))
}
