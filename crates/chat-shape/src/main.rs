//! chat-shape: resolve, encode and read messages for an on-chain chat contract

use alloy::primitives::Address;
use clap::{Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use chat_shape_adapters::{
    probe_health, AdapterConfig, BlockscoutAdapter, RpcAdapter, SourcifyAdapter,
};
use chat_shape_core::{
    encode_send, extract_selectors, fetch_feed, fetch_log_messages, ChainPort, FeedRequest,
    PageParams, Resolver, ResolverConfig,
};

type LiveResolver = Resolver<RpcAdapter, BlockscoutAdapter, SourcifyAdapter>;

#[derive(Parser)]
#[command(
    name = "chat-shape",
    about = "Work out how to talk to an on-chain chat contract without a verified ABI",
    long_about = "
Resolves the contract's send function and message event from whatever is
available (verified ABI, explorer-decoded calls, bytecode + signature database,
raw logs), then encodes outgoing messages and decodes history.

ENVIRONMENT VARIABLES:
  CHAT_SHAPE_RPC_URL            JSON-RPC endpoint
  CHAT_SHAPE_EXPLORER_URL       Blockscout base URL
  CHAT_SHAPE_SIGNATURE_DB_URL   Signature database lookup URL
  CHAT_SHAPE_TX_EXPLORER_URL    Transaction link base URL
  CHAT_SHAPE_CONTRACT           Chat contract address
  CHAT_SHAPE_HTTP_TIMEOUT_MS    Per-request timeout
  CHAT_SHAPE_SIGNATURE_CACHE    Cache signature lookups (true/false)
  RUST_LOG                      Log filter (logs go to stderr)
",
    version
)]
struct Cli {
    /// Chat contract address (overrides configuration)
    #[arg(long, global = true)]
    contract: Option<Address>,

    /// Skip the eth_call dry run of bytecode candidates
    #[arg(long, global = true)]
    no_probe: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and print the contract shape
    Resolve,

    /// Build calldata for sending a message
    Encode {
        /// Message text
        message: String,
    },

    /// Decoded message history from the explorer
    History {
        /// Page size, clamped to 5..=50
        #[arg(long)]
        limit: Option<usize>,
        /// Cursor returned by a previous page, as JSON
        #[arg(long)]
        page: Option<String>,
    },

    /// Messages decoded from recent event logs
    Logs {
        /// How many blocks back from the head to read
        #[arg(long, default_value_t = 5_000)]
        blocks: u64,
    },

    /// PUSH4 selectors found in bytecode
    Selectors {
        /// Hex bytecode; fetched from the chain when omitted
        #[arg(long)]
        code: Option<String>,
    },

    /// Probe RPC latency
    Health,

    /// Block explorer link for a transaction hash
    #[command(name = "tx-url")]
    TxUrl { hash: String },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_resolver(config: &AdapterConfig, probe: bool) -> Result<LiveResolver> {
    let chain = RpcAdapter::with_config(config)?;
    let explorer = BlockscoutAdapter::with_config(config)?;
    let signatures = SourcifyAdapter::with_config(config)?;
    Ok(Resolver::new(
        chain,
        explorer,
        signatures,
        ResolverConfig {
            probe_candidates: probe,
            ..ResolverConfig::default()
        },
    ))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AdapterConfig::from_env();
    if let Some(contract) = cli.contract {
        config.contract = contract;
    }
    let contract = config.contract;

    match cli.command {
        Command::Resolve => {
            let resolver = build_resolver(&config, !cli.no_probe)?;
            let shape = resolver.resolve_shape(contract).await?;
            print_json(&shape)?;
        }

        Command::Encode { message } => {
            let resolver = build_resolver(&config, !cli.no_probe)?;
            let shape = resolver.resolve_shape(contract).await?;
            let data = encode_send(&shape, &message)?;
            print_json(&json!({
                "to": shape.contract,
                "method": shape.method_call(),
                "data": data,
            }))?;
        }

        Command::History { limit, page } => {
            let page = page
                .map(|raw| serde_json::from_str::<PageParams>(&raw))
                .transpose()
                .wrap_err("--page must be the JSON cursor from a previous page")?;
            let resolver = build_resolver(&config, !cli.no_probe)?;
            let shape = match resolver.resolve_shape(contract).await {
                Ok(shape) => Some(shape),
                Err(e) => {
                    warn!(error = %e, "reading history without a resolved shape");
                    None
                }
            };
            let feed = fetch_feed(
                &resolver.explorer,
                contract,
                shape.as_ref(),
                &FeedRequest { limit, page },
            )
            .await?;
            let items: Vec<_> = feed
                .items
                .iter()
                .map(|m| {
                    let link = m.tx_hash.and_then(|h| config.tx_url(&h.to_string()));
                    json!({ "message": m, "link": link })
                })
                .collect();
            print_json(&json!({
                "items": items,
                "nextPageParams": feed.next_page_params,
            }))?;
        }

        Command::Logs { blocks } => {
            let resolver = build_resolver(&config, !cli.no_probe)?;
            let shape = resolver.resolve_shape(contract).await?;
            if !shape.is_decodable() {
                return Err(eyre!(
                    "no message event known for {}, logs cannot be decoded",
                    shape.method_call()
                ));
            }
            let messages = fetch_log_messages(&resolver.chain, &shape, blocks).await?;
            info!(count = messages.len(), "decoded log messages");
            print_json(&messages)?;
        }

        Command::Selectors { code } => {
            let selectors = match code {
                Some(code) => extract_selectors(&code),
                None => {
                    let rpc = RpcAdapter::with_config(&config)?;
                    let code = rpc.get_code(contract).await?;
                    chat_shape_core::extract_selectors_from_bytes(&code)
                }
            };
            print_json(&selectors)?;
        }

        Command::Health => {
            let rpc = RpcAdapter::with_config(&config)?;
            let health = probe_health(&rpc, config.health_green_ms).await;
            print_json(&health)?;
        }

        Command::TxUrl { hash } => match config.tx_url(&hash) {
            Some(url) => println!("{url}"),
            None => return Err(eyre!("missing tx hash: expected a 0x-prefixed hash")),
        },
    }

    Ok(())
}
