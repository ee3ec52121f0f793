//! PUSH4 operand scan over raw contract bytecode.
//!
//! Not instruction-aware: any `0x63` byte is treated as PUSH4, so operands of
//! other pushes and metadata bytes can yield false positives.

use alloy::primitives::{hex, Selector};

/// EVM `PUSH4` opcode.
pub const PUSH4: u8 = 0x63;

/// Distinct PUSH4 operands in first-seen order. Malformed hex yields nothing.
pub fn extract_selectors(code_hex: &str) -> Vec<Selector> {
    let code = code_hex.trim();
    let code = code.strip_prefix("0x").unwrap_or(code);
    match hex::decode(code) {
        Ok(bytes) => extract_selectors_from_bytes(&bytes),
        Err(_) => Vec::new(),
    }
}

pub fn extract_selectors_from_bytes(code: &[u8]) -> Vec<Selector> {
    let mut out: Vec<Selector> = Vec::new();
    let mut i = 0;
    while i + 5 <= code.len() {
        if code[i] == PUSH4 {
            let selector = Selector::from_slice(&code[i + 1..i + 5]);
            if !out.contains(&selector) {
                out.push(selector);
            }
        }
        i += 1;
    }
    out
}
