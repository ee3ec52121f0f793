//! Textual signature parsing for database and explorer method strings.

use alloy::primitives::{keccak256, Selector, B256};

use crate::domain::TextSignature;

/// Parse `name(type a, type b)` into a name and bare type list.
///
/// Returns `None` unless the name is `[A-Za-z0-9_]+` and the text ends with
/// the matching close paren. Commas inside tuple parens do not split.
pub fn parse_text_sig(text: &str) -> Option<TextSignature> {
    let trimmed = text.trim();
    let open = trimmed.find('(')?;
    if !trimmed.ends_with(')') {
        return None;
    }
    let name = &trimmed[..open];
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let inside = trimmed[open + 1..trimmed.len() - 1].trim();
    let types = split_top_level(inside)
        .into_iter()
        .filter_map(|param| param.split_whitespace().next().map(str::to_owned))
        .collect();
    Some(TextSignature {
        name: name.to_owned(),
        types,
        text: text.to_owned(),
    })
}

/// Like [`parse_text_sig`] but never fails: unparseable text becomes `unknown()`.
pub fn parse_method_call(method_call: &str) -> TextSignature {
    parse_text_sig(method_call).unwrap_or_else(|| TextSignature {
        name: "unknown".to_owned(),
        types: Vec::new(),
        text: method_call.to_owned(),
    })
}

fn split_top_level(inside: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in inside.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(inside[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(inside[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

pub fn function_selector(canonical: &str) -> Selector {
    let hash = keccak256(canonical.as_bytes());
    Selector::from_slice(&hash[..4])
}

pub fn event_topic(canonical: &str) -> B256 {
    keccak256(canonical.as_bytes())
}
