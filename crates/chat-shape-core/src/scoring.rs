//! Candidate ranking by chat vocabulary and event-parameter plausibility.

use crate::domain::{ArgumentType, EventParam, SignatureCandidate};

/// Chat-domain tokens matched case-insensitively as substrings.
pub const CHAT_VOCABULARY: [&str; 10] = [
    "message", "chat", "post", "write", "send", "say", "speak", "publish", "shout", "cast",
];

pub const FUNCTION_HIT_WEIGHT: i32 = 5;
pub const EVENT_HIT_WEIGHT: i32 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scorer {
    vocabulary: Vec<String>,
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(CHAT_VOCABULARY.iter().map(|s| (*s).to_owned()).collect())
    }
}

impl Scorer {
    pub fn new(vocabulary: Vec<String>) -> Self {
        Self {
            vocabulary: vocabulary.into_iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    fn hits(&self, name: &str) -> i32 {
        let lower = name.to_lowercase();
        self.vocabulary
            .iter()
            .filter(|token| lower.contains(token.as_str()))
            .count() as i32
    }

    pub fn score_function_name(&self, name: &str) -> i32 {
        self.hits(name) * FUNCTION_HIT_WEIGHT
    }

    pub fn score_event_name(&self, name: &str) -> i32 {
        self.hits(name) * EVENT_HIT_WEIGHT
    }
}

pub fn score_function_name(name: &str) -> i32 {
    Scorer::default().score_function_name(name)
}

pub fn score_event_name(name: &str) -> i32 {
    Scorer::default().score_event_name(name)
}

/// Highest score first; equal scores keep discovery order.
pub fn rank(candidates: &mut [SignatureCandidate]) {
    candidates.sort_by(|a, b| b.score.cmp(&a.score));
}

/// Likelihood that a parameter of this type is stored as a topic.
pub fn type_weight(ty: &str) -> i32 {
    let ty = ty.trim();
    if ty == "address" {
        100
    } else if ty.starts_with("uint") || ty.starts_with("int") {
        80
    } else if ty.starts_with("bytes") && ty != "bytes" {
        70
    } else if ty == "bool" {
        60
    } else if ty == "string" || ty == "bytes" {
        10
    } else {
        20
    }
}

/// Guess which declared parameters are indexed when only the topic count is known.
///
/// Static types go first in descending weight; dynamic ones are only indexed,
/// left to right, once every static parameter is already used up.
pub fn infer_indexed(types: &[String], indexed_count: usize) -> Vec<bool> {
    let mut indexed = vec![false; types.len()];
    let mut remaining = indexed_count;

    let mut order: Vec<(usize, i32)> = types
        .iter()
        .enumerate()
        .map(|(i, t)| (i, type_weight(t)))
        .collect();
    order.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, _) in order {
        if remaining == 0 {
            break;
        }
        if ArgumentType::from_abi(&types[i]).is_some() {
            continue;
        }
        indexed[i] = true;
        remaining -= 1;
    }

    for flag in indexed.iter_mut() {
        if remaining == 0 {
            break;
        }
        if !*flag {
            *flag = true;
            remaining -= 1;
        }
    }

    indexed
}

/// Human-facing names: first address is `from`, first string (else first
/// bytes) is `message`, everything else `arg<i>`.
pub fn label_event_params(types: &[String]) -> Vec<String> {
    let mut names: Vec<String> = (0..types.len()).map(|i| format!("arg{i}")).collect();
    if let Some(i) = types.iter().position(|t| t == "address") {
        names[i] = "from".to_owned();
    }
    let message = types
        .iter()
        .position(|t| t == "string")
        .or_else(|| {
            types
                .iter()
                .enumerate()
                .position(|(i, t)| t == "bytes" && names[i] == format!("arg{i}"))
        });
    if let Some(i) = message {
        names[i] = "message".to_owned();
    }
    names
}

/// Synthesized event inputs for a bare signature observed with `topics_len` topics.
pub fn synthesize_event_params(types: &[String], topics_len: usize) -> Vec<EventParam> {
    let indexed = infer_indexed(types, topics_len.saturating_sub(1));
    label_event_params(types)
        .into_iter()
        .zip(types.iter())
        .zip(indexed)
        .map(|((name, ty), indexed)| EventParam {
            name,
            ty: ty.clone(),
            indexed,
        })
        .collect()
}
