pub mod abi;
pub mod decode;
pub mod domain;
pub mod encode;
pub mod feed;
pub mod ports;
pub mod resolver;
pub mod scoring;
pub mod selectors;
pub mod signature;

pub use abi::{AbiEvent, AbiFunction, AbiItem, AbiParam, ContractAbi};
pub use decode::{decode, decode_logs, decode_transactions, extract_message, MessageSource};
pub use domain::{
    parse_selector, ArgumentType, ChatMessage, ContractShape, DecodedCall, DecodedMessage,
    DecodedParam, EventLayout, EventParam, ExplorerTransaction, LogFilter, PageParams, RawLog,
    RawReceipt, RawTransaction, ShapeSource, SignatureCandidate, SignatureKind, TextSignature,
    TimestampMs, TransactionPage, TxStatus,
};
pub use encode::{bytes_to_text, decode_send, encode_call, encode_send, EncodeError};
pub use feed::{clamp_limit, fetch_feed, fetch_log_messages, FeedPage, FeedRequest};
pub use ports::{ChainPort, ExplorerPort, PortError, SignatureMatches, SignaturePort};
pub use resolver::{Resolver, ResolverConfig, ShapeError};
pub use scoring::{
    infer_indexed, score_event_name, score_function_name, type_weight, Scorer, CHAT_VOCABULARY,
};
pub use selectors::{extract_selectors, extract_selectors_from_bytes};
pub use signature::{event_topic, function_selector, parse_method_call, parse_text_sig};
