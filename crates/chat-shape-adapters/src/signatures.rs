//! Sourcify signature database client with spurious connection detection.
//!
//! Uses the Signature Database lookup endpoint:
//! https://docs.sourcify.dev/docs/api/#/Signature%20Database/get_signature_database_v1_lookup

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use alloy::primitives::{Selector, B256};
use serde::Deserialize;
use tracing::{debug, warn};

use chat_shape_core::{parse_selector, PortError, SignatureMatches, SignaturePort};

use crate::AdapterConfig;

/// How many requests can fail before we mark the connection as spurious
const MAX_FAILED_REQUESTS: usize = 3;

/// Maximum cached keys (to prevent unbounded growth)
const MAX_CACHED_KEYS: usize = 1000;

/// Acquire mutex lock, recovering from poisoned state if necessary.
macro_rules! lock_or_recover {
    ($mutex:expr) => {
        match $mutex.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("signature cache mutex was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    };
}

#[derive(Debug, Deserialize)]
struct SourcifyResponse {
    ok: bool,
    #[serde(default)]
    result: SourcifyResult,
}

#[derive(Debug, Default, Deserialize)]
struct SourcifyResult {
    #[serde(default)]
    function: HashMap<String, Option<Vec<SignatureEntry>>>,
    #[serde(default)]
    event: HashMap<String, Option<Vec<SignatureEntry>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureEntry {
    name: String,
    has_verified_contract: Option<bool>,
}

/// Signature texts for function selectors and event topics, keyed by normalized hex.
type Found = (HashMap<String, Vec<String>>, HashMap<String, Vec<String>>);

/// Batched selector/topic lookup.
///
/// Tracks failed requests and reports "no data" without touching the network
/// after `MAX_FAILED_REQUESTS` consecutive connectivity failures.
#[derive(Debug, Clone)]
pub struct SourcifyAdapter {
    url: String,
    client: reqwest::Client,
    /// Only present when caching is enabled.
    cache: Option<Arc<Mutex<HashMap<String, Vec<String>>>>>,
    /// Whether the API connection appears to be down
    is_spurious: Arc<AtomicBool>,
    /// Count of consecutive failed requests
    failed_count: Arc<AtomicUsize>,
}

impl SourcifyAdapter {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
            cache: None,
            is_spurious: Arc::new(AtomicBool::new(false)),
            failed_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_config(config: &AdapterConfig) -> Result<Self, PortError> {
        let adapter = Self::new(config.signature_db_url.clone(), config.http_client()?);
        Ok(if config.signature_cache_enabled {
            adapter.with_cache()
        } else {
            adapter
        })
    }

    pub fn with_cache(mut self) -> Self {
        self.cache = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    /// Check if the API appears to be down
    pub fn is_spurious(&self) -> bool {
        self.is_spurious.load(Ordering::Relaxed)
    }

    /// Reset spurious state (e.g., for retry)
    pub fn reset_spurious(&self) {
        self.is_spurious.store(false, Ordering::Relaxed);
        self.failed_count.store(0, Ordering::Relaxed);
    }

    pub fn is_cached(&self, key: &str) -> bool {
        let key = normalize_key(key);
        self.cache
            .as_ref()
            .map_or(false, |c| lock_or_recover!(c).contains_key(&key))
    }

    fn on_success(&self) {
        self.failed_count.store(0, Ordering::Relaxed);
    }

    fn on_failure(&self, reason: &str) {
        let count = self.failed_count.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(count, max = MAX_FAILED_REQUESTS, reason, "signature lookup failed");
        if count >= MAX_FAILED_REQUESTS {
            warn!(count, "marking signature database as spurious");
            self.is_spurious.store(true, Ordering::Relaxed);
        }
    }

    fn on_request_error(&self, err: &reqwest::Error) {
        // Only connectivity-type errors count towards the spurious threshold
        let is_connectivity_error = err.is_timeout()
            || err.is_connect()
            || err.status().map_or(false, |s| s.is_server_error())
            || err.is_request();
        if is_connectivity_error {
            self.on_failure(&err.to_string());
        }
    }

    async fn fetch_batch(&self, functions: &[String], events: &[String]) -> Result<Found, PortError> {
        if functions.is_empty() && events.is_empty() {
            return Ok(Found::default());
        }

        // e.g. ?function=0xa9059cbb,0x095ea7b3&event=0xddf2...&filter=true
        let mut query = Vec::new();
        if !functions.is_empty() {
            query.push(format!("function={}", functions.join(",")));
        }
        if !events.is_empty() {
            query.push(format!("event={}", events.join(",")));
        }
        query.push("filter=true".to_owned());
        let url = format!("{}?{}", self.url, query.join("&"));
        debug!(%url, "signature lookup");

        let response = match self
            .client
            .get(&url)
            .header("accept", "application/json")
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                self.on_request_error(&e);
                return Err(PortError::Transport(format!(
                    "failed to fetch from signature database: {e}"
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() {
                self.on_failure(status.as_str());
            }
            return Err(PortError::Transport(format!(
                "signature database status {status}"
            )));
        }

        let body: SourcifyResponse = response
            .json()
            .await
            .map_err(|e| PortError::Decode(format!("failed to parse signature response: {e}")))?;
        if !body.ok {
            return Err(PortError::Decode(
                "signature database returned ok=false".to_owned(),
            ));
        }

        self.on_success();
        Ok((
            flatten_entries(body.result.function),
            flatten_entries(body.result.event),
        ))
    }
}

/// Verified signatures first, database order otherwise.
fn flatten_entries(
    raw: HashMap<String, Option<Vec<SignatureEntry>>>,
) -> HashMap<String, Vec<String>> {
    raw.into_iter()
        .map(|(key, entries)| {
            let mut entries = entries.unwrap_or_default();
            entries.sort_by(|a, b| {
                b.has_verified_contract
                    .unwrap_or(false)
                    .cmp(&a.has_verified_contract.unwrap_or(false))
            });
            (
                normalize_key(&key),
                entries.into_iter().map(|e| e.name).collect(),
            )
        })
        .collect()
}

impl SignaturePort for SourcifyAdapter {
    async fn lookup(
        &self,
        functions: &[Selector],
        events: &[B256],
    ) -> Result<SignatureMatches, PortError> {
        // Short-circuit if API is marked as down
        if self.is_spurious() {
            debug!("skipping lookup, signature database marked as spurious");
            return Ok(SignatureMatches::default());
        }

        let mut found_functions: HashMap<String, Vec<String>> = HashMap::new();
        let mut found_events: HashMap<String, Vec<String>> = HashMap::new();
        let mut fetch_functions = Vec::new();
        let mut fetch_events = Vec::new();
        {
            let cache = self.cache.as_ref().map(|c| lock_or_recover!(c));
            for key in functions.iter().map(|s| normalize_key(&s.to_string())) {
                match cache.as_ref().and_then(|c| c.get(&key)) {
                    Some(hit) => {
                        found_functions.insert(key, hit.clone());
                    }
                    None if !fetch_functions.contains(&key) => fetch_functions.push(key),
                    None => {}
                }
            }
            for key in events.iter().map(|t| normalize_key(&t.to_string())) {
                match cache.as_ref().and_then(|c| c.get(&key)) {
                    Some(hit) => {
                        found_events.insert(key, hit.clone());
                    }
                    None if !fetch_events.contains(&key) => fetch_events.push(key),
                    None => {}
                }
            }
        }

        let (fetched_functions, fetched_events) =
            self.fetch_batch(&fetch_functions, &fetch_events).await?;

        if let Some(cache) = &self.cache {
            let mut cache = lock_or_recover!(cache);
            // Misses are cached too, so an unknown selector is asked once.
            for key in fetch_functions.iter().chain(fetch_events.iter()) {
                if cache.len() >= MAX_CACHED_KEYS {
                    break;
                }
                let value = fetched_functions
                    .get(key)
                    .or_else(|| fetched_events.get(key))
                    .cloned()
                    .unwrap_or_default();
                cache.insert(key.clone(), value);
            }
        }
        found_functions.extend(fetched_functions);
        found_events.extend(fetched_events);

        let mut out = SignatureMatches::default();
        for (key, texts) in found_functions {
            if texts.is_empty() {
                continue;
            }
            if let Some(selector) = parse_selector(&key) {
                out.functions.insert(selector, texts);
            }
        }
        for (key, texts) in found_events {
            if texts.is_empty() {
                continue;
            }
            if let Ok(topic) = key.parse::<B256>() {
                out.events.insert(topic, texts);
            }
        }
        Ok(out)
    }
}

/// Normalize selector or topic to lowercase with 0x prefix
fn normalize_key(key: &str) -> String {
    let key = key.trim().to_lowercase();
    if key.starts_with("0x") {
        key
    } else {
        format!("0x{key}")
    }
}
