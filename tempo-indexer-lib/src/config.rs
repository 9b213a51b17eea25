use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use tempo_runtime::settings::{env_bool, env_parse, env_str};

/// Where polling starts when no cursor exists yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBlock {
    Latest,
    Number(u64),
}

/// Indexer-specific configuration. Pair/stabilizer watchlists and the RPC
/// endpoint can be pinned via environment; anything not pinned follows the
/// registry snapshot and refreshes with it.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chain_key: String,
    pub chain_id: i64,
    pub rpc_url_override: Option<String>,
    pub pair_addresses_override: Option<Vec<String>>,
    pub stabilizer_addresses_override: Option<Vec<String>>,
    pub poll_interval: Duration,
    pub start_block: StartBlock,
    pub confirmation_depth_override: Option<u64>,
    pub native_usd_price: Decimal,
    pub swap_fee_bps: u32,
    pub protocol_revenue_share_bps: u32,
    pub enable_simulation: bool,
    pub simulation_interval: Duration,
    pub registry_refresh: Duration,
}

fn env_csv(name: &str) -> Option<Vec<String>> {
    let raw = std::env::var(name).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}

impl IndexerConfig {
    pub fn from_env() -> Self {
        let start_block = match env_str("INDEXER_START_BLOCK", "latest").trim().to_lowercase() {
            s if s == "latest" => StartBlock::Latest,
            s => s.parse::<u64>().map(StartBlock::Number).unwrap_or(StartBlock::Latest),
        };

        IndexerConfig {
            chain_key: env_str("INDEXER_CHAIN_KEY", "hardhat-local"),
            chain_id: env_parse("INDEXER_CHAIN_ID", 31337),
            rpc_url_override: std::env::var("INDEXER_RPC_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            pair_addresses_override: env_csv("INDEXER_PAIR_ADDRESSES"),
            stabilizer_addresses_override: env_csv("INDEXER_STABILIZER_ADDRESSES"),
            poll_interval: Duration::from_secs(env_parse("INDEXER_POLL_INTERVAL_SECONDS", 5u64)),
            start_block,
            confirmation_depth_override: std::env::var("INDEXER_CONFIRMATION_DEPTH")
                .ok()
                .and_then(|v| v.trim().parse().ok()),
            native_usd_price: std::env::var("INDEXER_NATIVE_USD_PRICE")
                .ok()
                .and_then(|v| Decimal::from_str(v.trim()).ok())
                .unwrap_or_else(|| Decimal::from(3300u32)),
            swap_fee_bps: env_parse("INDEXER_SWAP_FEE_BPS", 30),
            protocol_revenue_share_bps: env_parse("INDEXER_PROTOCOL_REVENUE_SHARE_BPS", 4000),
            enable_simulation: env_bool("INDEXER_ENABLE_SIMULATION", false),
            simulation_interval: Duration::from_secs(env_parse(
                "INDEXER_SIMULATION_INTERVAL_SECONDS",
                30u64,
            )),
            registry_refresh: Duration::from_secs(env_parse(
                "INDEXER_REGISTRY_REFRESH_SECONDS",
                60u64,
            )),
        }
    }
}
