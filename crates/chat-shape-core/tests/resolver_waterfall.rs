mod common;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Bytes, B256};
use serde_json::json;

use chat_shape_core::{
    decode_logs, encode_send, event_topic, function_selector, ArgumentType, RawLog,
    RawTransaction, ShapeError, ShapeSource,
};
use common::*;

const CHAT_ABI: &str = r#"[
    {"type":"function","name":"getMessage","stateMutability":"view",
     "inputs":[{"name":"id","type":"string"}],"outputs":[{"name":"","type":"string"}]},
    {"type":"function","name":"transfer","stateMutability":"nonpayable",
     "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}]},
    {"type":"function","name":"sendMessage","stateMutability":"nonpayable",
     "inputs":[{"name":"text","type":"string"}]},
    {"type":"event","name":"Transfer","anonymous":false,
     "inputs":[{"name":"from","type":"address","indexed":true},
               {"name":"to","type":"address","indexed":true},
               {"name":"value","type":"uint256","indexed":false}]},
    {"type":"event","name":"MessagePosted","anonymous":false,
     "inputs":[{"name":"from","type":"address","indexed":true},
               {"name":"message","type":"string","indexed":false}]}
]"#;

/// Bytecode fragment with a `PUSH4` for every selector, padded with unrelated opcodes.
fn bytecode_with(selectors: &[&str]) -> Bytes {
    let mut code = vec![0x60, 0x80, 0x60, 0x40, 0x52];
    for s in selectors {
        code.push(0x63);
        code.extend_from_slice(selector(s).as_slice());
        code.extend_from_slice(&[0x14, 0x61, 0x00, 0x2a, 0x57]);
    }
    Bytes::from(code)
}

fn message_log(block: u64, tx: B256, text: &str) -> RawLog {
    RawLog {
        address: Some(contract()),
        topics: vec![
            event_topic("MessagePosted(address,string)"),
            sender().into_word(),
        ],
        data: DynSolValue::Tuple(vec![DynSolValue::String(text.to_owned())])
            .abi_encode_params()
            .into(),
        block_number: Some(block),
        transaction_hash: Some(tx),
        log_index: Some(0),
    }
}

#[tokio::test]
async fn verified_abi_picks_send_function_and_event() {
    let explorer = FakeExplorer {
        abi: Some(CHAT_ABI.to_owned()),
        ..Default::default()
    };
    let resolver = resolver(FakeChain::default(), explorer, FakeSignatures::default());

    let shape = resolver
        .resolve_shape(contract())
        .await
        .expect("shape from verified abi");

    assert_eq!(shape.selector, function_selector("sendMessage(string)"));
    assert_eq!(shape.function_name, "sendMessage");
    assert_eq!(shape.argument_type, ArgumentType::String);
    assert_eq!(shape.source, ShapeSource::VerifiedAbi);

    let event = shape.event.as_ref().expect("event layout");
    assert_eq!(event.name, "MessagePosted");
    assert_eq!(
        event.signature_hash,
        event_topic("MessagePosted(address,string)")
    );
    assert!(event.params[0].indexed);
    assert!(!event.params[1].indexed);
    assert_eq!(event.text_index, Some(1));
    assert_eq!(event.sender_index, Some(0));

    // Later stages never run once the ABI answers.
    assert_eq!(resolver.explorer.count("transactions"), 0);
    assert_eq!(resolver.chain.count("eth_"), 0);
}

#[tokio::test]
async fn abi_without_text_event_falls_through_to_decoded_calls() {
    let abi = json!([
        {"type":"function","name":"post","inputs":[{"name":"m","type":"string"}]}
    ])
    .to_string();
    let sel = selector("0xabcd1234");
    let explorer = FakeExplorer {
        abi: Some(abi),
        txs: vec![decoded_tx(sel, "post(string m)", vec![("string", json!("gm"))])],
        ..Default::default()
    };
    let resolver = resolver(FakeChain::default(), explorer, FakeSignatures::default());

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.source, ShapeSource::DecodedTransactions);
    assert_eq!(shape.selector, sel);
}

#[tokio::test]
async fn decoded_calls_vote_on_selector() {
    let chat = selector("0xabcd1234");
    let approve = selector("0x095ea7b3");
    let mut txs = Vec::new();
    for _ in 0..20 {
        txs.push(decoded_tx(
            approve,
            "approve(address spender, uint256 amount)",
            vec![
                ("address", json!("0x1000000000000000000000000000000000000001")),
                ("uint256", json!("1")),
            ],
        ));
    }
    for i in 0..10 {
        txs.push(decoded_tx(
            chat,
            "shout(string text)",
            vec![("string", json!(format!("hello {i}")))],
        ));
    }
    let explorer = FakeExplorer {
        txs,
        ..Default::default()
    };
    let resolver = resolver(FakeChain::default(), explorer, FakeSignatures::default());

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.selector, chat);
    assert_eq!(shape.function_name, "shout");
    assert_eq!(shape.argument_type, ArgumentType::String);
    assert_eq!(shape.inputs, vec!["string".to_owned()]);
    assert_eq!(shape.source, ShapeSource::DecodedTransactions);
    assert!(shape.event.is_none());
}

#[tokio::test]
async fn resolution_is_repeatable_on_unchanged_sources() {
    let chat = selector("0xabcd1234");
    let other = selector("0x11111111");
    let txs = vec![
        decoded_tx(other, "note(bytes b)", vec![("bytes", json!("0x6869"))]),
        decoded_tx(chat, "chat(string m)", vec![("string", json!("a"))]),
        decoded_tx(chat, "chat(string m)", vec![("string", json!("b"))]),
        decoded_tx(other, "note(bytes b)", vec![("bytes", json!("0x6869"))]),
    ];
    let explorer = FakeExplorer {
        txs,
        ..Default::default()
    };
    let resolver = resolver(FakeChain::default(), explorer, FakeSignatures::default());

    let first = resolver.resolve_shape(contract()).await.expect("first");
    let second = resolver.resolve_shape(contract()).await.expect("second");
    assert_eq!(first, second);
    // Equal counts: first seen wins.
    assert_eq!(first.selector, other);
    assert_eq!(first.argument_type, ArgumentType::Bytes);
}

#[tokio::test]
async fn bytecode_scan_keeps_only_text_candidates() {
    let chain = FakeChain {
        code: bytecode_with(&["0x12345678", "0xaaaaaaaa"]),
        ..Default::default()
    };
    let mut signatures = FakeSignatures::default();
    signatures.functions.insert(
        selector("0x12345678"),
        vec![
            "transfer(address,uint256)".to_owned(),
            "chatPost(string)".to_owned(),
        ],
    );
    signatures
        .functions
        .insert(selector("0xaaaaaaaa"), vec!["withdraw(uint256)".to_owned()]);
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.selector, selector("0x12345678"));
    assert_eq!(shape.function_name, "chatPost");
    assert_eq!(shape.argument_type, ArgumentType::String);
    assert_eq!(shape.source, ShapeSource::BytecodeProbe);
    assert_eq!(resolver.chain.count("eth_call"), 1);
}

#[tokio::test]
async fn reverting_probe_moves_to_next_candidate() {
    let loud = selector("0x0000aaaa");
    let quiet = selector("0x0000bbbb");
    let chain = FakeChain {
        code: bytecode_with(&["0x0000aaaa", "0x0000bbbb"]),
        reverting: vec![loud],
        ..Default::default()
    };
    let mut signatures = FakeSignatures::default();
    signatures
        .functions
        .insert(loud, vec!["postMessage(string)".to_owned()]);
    signatures.functions.insert(quiet, vec!["say(string)".to_owned()]);
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.selector, quiet);
    assert_eq!(shape.function_name, "say");
}

/// Chain with one logged `shout(string)` call and the given bytecode.
fn chain_with_mined_message(code: Bytes, reverting: Vec<alloy::primitives::Selector>) -> FakeChain {
    let sel = selector("0x5fd4b08a");
    let tx_hash = B256::repeat_byte(0x44);
    let mut chain = FakeChain {
        code,
        reverting,
        latest: 10_000,
        logs: vec![message_log(9_990, tx_hash, "hello")],
        ..Default::default()
    };
    chain.txs.insert(
        tx_hash,
        RawTransaction {
            hash: tx_hash,
            from: sender(),
            to: Some(contract()),
            input: text_calldata(sel, "hello"),
        },
    );
    chain
}

#[tokio::test]
async fn all_probes_reverting_falls_through_to_log_mining() {
    let loud = selector("0x0000aaaa");
    let quiet = selector("0x0000bbbb");
    let chain = chain_with_mined_message(
        bytecode_with(&["0x0000bbbb", "0x0000aaaa"]),
        vec![loud, quiet],
    );
    let mut signatures = FakeSignatures::default();
    signatures
        .functions
        .insert(loud, vec!["postMessage(string)".to_owned()]);
    signatures.functions.insert(quiet, vec!["say(string)".to_owned()]);
    signatures
        .functions
        .insert(selector("0x5fd4b08a"), vec!["shout(string)".to_owned()]);
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(resolver.chain.count("eth_call"), 2);
    assert_eq!(shape.source, ShapeSource::LogMining);
    assert_eq!(shape.selector, selector("0x5fd4b08a"));
    assert_eq!(shape.function_name, "shout");
}

#[tokio::test]
async fn all_probes_reverting_without_logs_is_unavailable() {
    let loud = selector("0x0000aaaa");
    let chain = FakeChain {
        code: bytecode_with(&["0x0000aaaa"]),
        reverting: vec![loud],
        ..Default::default()
    };
    let mut signatures = FakeSignatures::default();
    signatures
        .functions
        .insert(loud, vec!["postMessage(string)".to_owned()]);
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let err = resolver.resolve_shape(contract()).await.expect_err("no shape");
    assert!(matches!(err, ShapeError::ShapeUnavailable));
}

#[tokio::test]
async fn multi_argument_candidate_is_skipped_for_sendable_log_shape() {
    let sel = selector("0x0000cccc");
    let chain = chain_with_mined_message(bytecode_with(&["0x0000cccc"]), Vec::new());
    let mut signatures = FakeSignatures::default();
    signatures
        .functions
        .insert(sel, vec!["postTo(address,string)".to_owned()]);
    signatures
        .functions
        .insert(selector("0x5fd4b08a"), vec!["shout(string)".to_owned()]);
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.source, ShapeSource::LogMining);
    assert_eq!(shape.selector, selector("0x5fd4b08a"));
    assert_eq!(shape.inputs, vec!["string".to_owned()]);
    assert!(shape.is_sendable());
    assert_eq!(resolver.chain.count("eth_call"), 0);
    let data = encode_send(&shape, "gm").expect("encode");
    assert_eq!(&data[..4], selector("0x5fd4b08a").as_slice());
}

#[tokio::test]
async fn explorer_outage_does_not_abort_resolution() {
    let sel = selector("0x12345678");
    let chain = FakeChain {
        code: bytecode_with(&["0x12345678"]),
        ..Default::default()
    };
    let explorer = FakeExplorer {
        fail_all: true,
        ..Default::default()
    };
    let mut signatures = FakeSignatures::default();
    signatures
        .functions
        .insert(sel, vec!["publish(bytes)".to_owned()]);
    let resolver = resolver(chain, explorer, signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.source, ShapeSource::BytecodeProbe);
    assert_eq!(shape.argument_type, ArgumentType::Bytes);
    assert_eq!(resolver.explorer.count("abi"), 1);
    assert_eq!(resolver.explorer.count("transactions"), 1);
}

#[tokio::test]
async fn log_mining_recovers_shape_and_event() {
    let sel = selector("0x5fd4b08a");
    let tx_hash = B256::repeat_byte(0x42);
    let mut chain = FakeChain {
        latest: 10_000,
        logs: vec![message_log(9_990, tx_hash, "hello")],
        ..Default::default()
    };
    chain.txs.insert(
        tx_hash,
        RawTransaction {
            hash: tx_hash,
            from: sender(),
            to: Some(contract()),
            input: text_calldata(sel, "hello"),
        },
    );
    let mut signatures = FakeSignatures::default();
    signatures.functions.insert(sel, vec!["shout(string)".to_owned()]);
    signatures.events.insert(
        event_topic("MessagePosted(address,string)"),
        vec!["MessagePosted(address,string)".to_owned()],
    );
    let resolver = resolver(chain, FakeExplorer::default(), signatures);

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.source, ShapeSource::LogMining);
    assert_eq!(shape.selector, sel);
    assert_eq!(shape.function_name, "shout");
    assert_eq!(shape.argument_type, ArgumentType::String);

    let event = shape.event.as_ref().expect("event layout");
    assert_eq!(event.name, "MessagePosted");
    assert_eq!(event.sender_index, Some(0));
    assert_eq!(event.text_index, Some(1));
    assert!(event.params[0].indexed);

    let decoded = decode_logs(event, &resolver.chain.logs);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0].from, Some(sender()));
    assert_eq!(decoded[0].text, "hello");
}

#[tokio::test]
async fn log_mining_without_name_uses_unknown() {
    let sel = selector("0x5fd4b08a");
    let tx_hash = B256::repeat_byte(0x43);
    let mut chain = FakeChain {
        latest: 100,
        logs: vec![message_log(90, tx_hash, "hi")],
        ..Default::default()
    };
    chain.txs.insert(
        tx_hash,
        RawTransaction {
            hash: tx_hash,
            from: sender(),
            to: Some(contract()),
            input: text_calldata(sel, "hi"),
        },
    );
    let resolver = resolver(chain, FakeExplorer::default(), FakeSignatures::default());

    let shape = resolver.resolve_shape(contract()).await.expect("shape");
    assert_eq!(shape.function_name, "unknown");
    assert!(shape.event.is_none());
}

#[tokio::test]
async fn failing_log_window_is_halved() {
    let chain = FakeChain {
        latest: 20_000,
        max_log_range: Some(700),
        logs: vec![message_log(19_800, B256::repeat_byte(1), "gm")],
        ..Default::default()
    };
    let resolver = resolver(chain, FakeExplorer::default(), FakeSignatures::default());

    let logs = resolver.scan_logs(contract()).await;
    assert_eq!(logs.len(), 1);
    // 5000, 2500 and 1250 fail; 625 succeeds.
    assert_eq!(resolver.chain.count("eth_getLogs"), 4);
}

#[tokio::test]
async fn empty_sources_mean_shape_unavailable() {
    let resolver = resolver(
        FakeChain::default(),
        FakeExplorer::default(),
        FakeSignatures::default(),
    );
    let err = resolver
        .resolve_shape(contract())
        .await
        .expect_err("nothing to resolve");
    assert_eq!(err, ShapeError::ShapeUnavailable);
}

#[tokio::test]
async fn failing_sources_mean_shape_unavailable() {
    let chain = FakeChain {
        fail_all: true,
        ..Default::default()
    };
    let explorer = FakeExplorer {
        fail_all: true,
        ..Default::default()
    };
    let signatures = FakeSignatures {
        fail_all: true,
        ..Default::default()
    };
    let resolver = resolver(chain, explorer, signatures);
    let err = resolver
        .resolve_shape(contract())
        .await
        .expect_err("every source down");
    assert_eq!(err, ShapeError::ShapeUnavailable);
}
