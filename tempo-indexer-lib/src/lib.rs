//! Per-chain polling loop: fetch confirmed log ranges, decode pair and
//! stabilizer events into raw notes, publish them to the raw topic.
//!
//! Delivery is at-least-once: the block cursor only advances after every
//! note in a range has been acknowledged by the broker, so a failed range is
//! re-polled on the next tick and the validator/writer idempotency guards
//! absorb the duplicates.

pub mod config;
pub mod events;

use prost::Message;
use rdkafka::producer::FutureProducer;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use tempo_runtime::TempoError;
use tempo_runtime::decimal::{dec_or_zero, scale_base_units};
use tempo_runtime::kafka;
use tempo_runtime::proto::{DexTxRaw, now_ts, ts_from_datetime};
use tempo_runtime::registry::{RegistryCache, is_evm_address};
use tempo_runtime::rpc::{EvmRpcClient, LogEntry, abi, selectors};
use tempo_runtime::settings::Settings;
use tempo_runtime::types::NoteAction;

use config::{IndexerConfig, StartBlock};
use events::{DecodedEvent, EventKind, PairMeta, TokenMeta, classify, decode_pair_log, decode_stabilizer_log, topic0_candidates};

/// Max blocks fetched per poll.
const MAX_BLOCK_SPAN: u64 = 100;

pub const SOURCE_CHAIN_INDEXER: &str = "chain-indexer";
pub const SOURCE_SIMULATION: &str = "indexer-simulation";

/// Deterministic note id for one logical chain event, stable across re-polls.
pub fn note_id_for_event(chain_id: i64, tx_hash: &str, log_index: u64, action: NoteAction) -> String {
    let name = format!("{chain_id}:{tx_hash}:{log_index}:{action}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

#[derive(Default)]
struct IndexCaches {
    pair_meta: HashMap<String, PairMeta>,
    token_meta: HashMap<String, TokenMeta>,
    receipt_gas: HashMap<String, (String, String)>,
    block_timestamps: HashMap<u64, u64>,
}

#[derive(Debug, Clone, Default)]
struct WatchState {
    rpc_url: String,
    pair_addresses: Vec<String>,
    stabilizer_addresses: Vec<String>,
    confirmation_depth: u64,
}

pub struct Indexer {
    settings: Settings,
    config: IndexerConfig,
    registry: Arc<RegistryCache>,
    producer: FutureProducer,
    rpc: Option<EvmRpcClient>,
    watch: WatchState,
    cursor: Option<u64>,
    caches: IndexCaches,
    last_registry_refresh: Option<Instant>,
    last_simulation: Option<Instant>,
    simulation_counter: u64,
}

impl Indexer {
    pub fn new(
        settings: Settings,
        config: IndexerConfig,
        registry: Arc<RegistryCache>,
        producer: FutureProducer,
    ) -> Self {
        Indexer {
            settings,
            config,
            registry,
            producer,
            rpc: None,
            watch: WatchState::default(),
            cursor: None,
            caches: IndexCaches::default(),
            last_registry_refresh: None,
            last_simulation: None,
            simulation_counter: 0,
        }
    }

    /// The main loop. Never returns under normal operation; per-tick errors
    /// are logged and retried on the next interval.
    pub async fn run(&mut self) {
        self.refresh_watchlists();
        let mut interval = tokio::time::interval(self.config.poll_interval);
        loop {
            interval.tick().await;

            if self
                .last_registry_refresh
                .map(|at| at.elapsed() >= self.config.registry_refresh)
                .unwrap_or(true)
            {
                self.refresh_watchlists();
            }

            match self.run_once().await {
                Ok(published) if published > 0 => {
                    tracing::info!(published, cursor = ?self.cursor, "poll complete");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, cursor = ?self.cursor, "poll failed, cursor held");
                }
            }

            if self.config.enable_simulation
                && self
                    .last_simulation
                    .map(|at| at.elapsed() >= self.config.simulation_interval)
                    .unwrap_or(true)
            {
                let note = self.next_simulation_note();
                match self.publish_note(&note).await {
                    Ok(()) => {
                        self.last_simulation = Some(Instant::now());
                        tracing::info!(note_id = %note.note_id, "published simulation note");
                    }
                    Err(err) => tracing::warn!(error = %err, "simulation publish failed"),
                }
            }
        }
    }

    /// Rebuild the watchlists from the registry snapshot, honoring env
    /// overrides for addresses and RPC endpoint.
    pub fn refresh_watchlists(&mut self) {
        self.registry.invalidate();
        let snapshot = self.registry.snapshot();
        let chain = snapshot.chains.iter().find(|c| c.chain_id == self.config.chain_id);

        let rpc_url = self
            .config
            .rpc_url_override
            .clone()
            .or_else(|| {
                let chain = chain?;
                std::env::var(&chain.rpc_env_key)
                    .ok()
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
            })
            .or_else(|| chain.map(|c| c.default_rpc_url.clone()))
            .unwrap_or_default();

        let pair_addresses = self
            .config
            .pair_addresses_override
            .clone()
            .or_else(|| chain.map(|c| c.indexer.pair_addresses.clone()))
            .unwrap_or_default();
        let stabilizer_addresses = self
            .config
            .stabilizer_addresses_override
            .clone()
            .or_else(|| chain.map(|c| c.indexer.stabilizer_addresses.clone()))
            .unwrap_or_default();

        let confirmation_depth = self
            .config
            .confirmation_depth_override
            .or_else(|| chain.map(|c| c.indexer.confirmation_depth))
            .unwrap_or(0);

        if self.watch.rpc_url != rpc_url {
            self.rpc = if rpc_url.is_empty() {
                None
            } else {
                Some(EvmRpcClient::new(&rpc_url))
            };
        }
        self.watch = WatchState {
            rpc_url,
            pair_addresses,
            stabilizer_addresses,
            confirmation_depth,
        };
        self.last_registry_refresh = Some(Instant::now());

        tracing::debug!(
            chain_id = self.config.chain_id,
            pairs = self.watch.pair_addresses.len(),
            stabilizers = self.watch.stabilizer_addresses.len(),
            "watchlists refreshed"
        );
    }

    /// Poll one block range and publish its notes. The cursor advances only
    /// when every publish succeeded.
    pub async fn run_once(&mut self) -> Result<usize, TempoError> {
        let Some(rpc) = self.rpc.clone() else {
            return Ok(0);
        };
        if self.watch.pair_addresses.is_empty() && self.watch.stabilizer_addresses.is_empty() {
            return Ok(0);
        }

        let head = rpc.block_number().await?;
        let Some(latest) = head.checked_sub(self.watch.confirmation_depth) else {
            return Ok(0);
        };

        let from = match self.cursor {
            Some(cursor) => cursor,
            None => match self.config.start_block {
                StartBlock::Latest => latest,
                // A numeric start waits for the chain to reach it.
                StartBlock::Number(n) => n.max(latest),
            },
        };
        if from > latest {
            return Ok(0);
        }
        let to = latest.min(from + MAX_BLOCK_SPAN);

        let mut addresses = self.watch.pair_addresses.clone();
        addresses.extend(self.watch.stabilizer_addresses.iter().cloned());

        let mut logs = rpc.get_logs(from, to, &addresses, &topic0_candidates()).await?;
        logs.sort_by_key(|log| (log.block_number, log.log_index));

        let mut published = 0usize;
        for log in &logs {
            if let Some(note) = self.note_from_log(&rpc, log).await? {
                self.publish_note(&note).await?;
                published += 1;
            }
        }

        self.cursor = Some(to + 1);
        Ok(published)
    }

    async fn publish_note(&self, note: &DexTxRaw) -> Result<(), TempoError> {
        kafka::publish(
            &self.producer,
            &self.settings.dex_tx_raw_topic,
            &note.note_id,
            &note.encode_to_vec(),
            Some(&note.correlation_id),
        )
        .await
    }

    async fn note_from_log(
        &mut self,
        rpc: &EvmRpcClient,
        log: &LogEntry,
    ) -> Result<Option<DexTxRaw>, TempoError> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let Some(kind) = classify(topic0) else {
            return Ok(None);
        };

        let decoded = match kind {
            EventKind::Swap | EventKind::Mint | EventKind::Burn => {
                let meta = self.pair_meta(rpc, &log.address).await?;
                decode_pair_log(kind, log, &meta)?
            }
            EventKind::NoteMinted | EventKind::NoteBurned => {
                let collateral_address = abi::decode_address(
                    log.topics
                        .get(2)
                        .ok_or_else(|| TempoError::Rpc("stabilizer log missing collateral topic".into()))?,
                )?;
                let collateral = self.token_meta(rpc, &collateral_address).await?;
                decode_stabilizer_log(kind, log, &collateral)?
            }
        };
        let Some(decoded) = decoded else {
            return Ok(None);
        };

        let (fee_usd, protocol_revenue_usd) = self.swap_fee_fields(&decoded);
        let (gas_used, gas_cost_usd) = self.gas_fields(rpc, &log.transaction_hash).await;
        let occurred_at = self.block_time(rpc, log.block_number).await;

        let note_id = note_id_for_event(
            self.config.chain_id,
            &log.transaction_hash,
            log.log_index,
            decoded.action,
        );

        Ok(Some(DexTxRaw {
            note_id,
            correlation_id: Uuid::new_v4().to_string(),
            chain_id: self.config.chain_id,
            tx_hash: log.transaction_hash.clone(),
            action: decoded.action.to_string(),
            user_address: decoded.user_address,
            pool_address: log.address.clone(),
            token_in: decoded.token_in,
            token_out: decoded.token_out,
            amount_in: decoded.amount_in,
            amount_out: decoded.amount_out,
            fee_usd,
            gas_used,
            gas_cost_usd,
            protocol_revenue_usd,
            min_out: "0".into(),
            block_number: log.block_number as i64,
            occurred_at: Some(occurred_at),
            source: SOURCE_CHAIN_INDEXER.into(),
        }))
    }

    /// Stable-in swaps are valued at ingest time; anything else is priced by
    /// the downstream valuation jobs.
    fn swap_fee_fields(&self, decoded: &DecodedEvent) -> (String, String) {
        if decoded.action != NoteAction::Swap
            || !decoded.token_in.eq_ignore_ascii_case("musd")
        {
            return ("0".into(), "0".into());
        }
        let amount_in = dec_or_zero(&decoded.amount_in);
        let fee = amount_in * Decimal::from(self.config.swap_fee_bps) / Decimal::from(10_000u32);
        let revenue =
            fee * Decimal::from(self.config.protocol_revenue_share_bps) / Decimal::from(10_000u32);
        (fee.normalize().to_string(), revenue.normalize().to_string())
    }

    async fn gas_fields(&mut self, rpc: &EvmRpcClient, tx_hash: &str) -> (String, String) {
        if let Some(cached) = self.caches.receipt_gas.get(tx_hash) {
            return cached.clone();
        }
        let fields = match rpc.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => {
                let wei = receipt.gas_used.saturating_mul(receipt.effective_gas_price);
                let gas_native = dec_or_zero(&scale_base_units(&wei.to_string(), 18));
                let gas_cost_usd = gas_native * self.config.native_usd_price;
                (
                    receipt.gas_used.to_string(),
                    gas_cost_usd.normalize().to_string(),
                )
            }
            Ok(None) => ("0".into(), "0".into()),
            Err(err) => {
                tracing::debug!(error = %err, tx_hash, "receipt lookup failed, gas left at zero");
                ("0".into(), "0".into())
            }
        };
        self.caches.receipt_gas.insert(tx_hash.to_string(), fields.clone());
        fields
    }

    async fn block_time(&mut self, rpc: &EvmRpcClient, block_number: u64) -> prost_types::Timestamp {
        if let Some(ts) = self.caches.block_timestamps.get(&block_number) {
            return prost_types::Timestamp { seconds: *ts as i64, nanos: 0 };
        }
        match rpc.block_timestamp(block_number).await {
            Ok(ts) => {
                self.caches.block_timestamps.insert(block_number, ts);
                prost_types::Timestamp { seconds: ts as i64, nanos: 0 }
            }
            Err(err) => {
                tracing::debug!(error = %err, block_number, "block timestamp lookup failed");
                ts_from_datetime(chrono::Utc::now())
            }
        }
    }

    async fn pair_meta(&mut self, rpc: &EvmRpcClient, pair_address: &str) -> Result<PairMeta, TempoError> {
        if let Some(meta) = self.caches.pair_meta.get(pair_address) {
            return Ok(meta.clone());
        }
        let token0_address =
            abi::decode_address(&rpc.eth_call(pair_address, selectors::TOKEN0).await?)?;
        let token1_address =
            abi::decode_address(&rpc.eth_call(pair_address, selectors::TOKEN1).await?)?;
        let token0 = self.token_meta(rpc, &token0_address).await?;
        let token1 = self.token_meta(rpc, &token1_address).await?;
        let meta = PairMeta {
            token0_address,
            token1_address,
            token0,
            token1,
        };
        self.caches.pair_meta.insert(pair_address.to_string(), meta.clone());
        Ok(meta)
    }

    /// Token metadata: registry book first, then on-chain `symbol()` and
    /// `decimals()` with defaults on failure.
    async fn token_meta(&mut self, rpc: &EvmRpcClient, token_address: &str) -> Result<TokenMeta, TempoError> {
        let key = token_address.to_lowercase();
        if let Some(meta) = self.caches.token_meta.get(&key) {
            return Ok(meta.clone());
        }

        let snapshot = self.registry.snapshot();
        let from_registry = snapshot
            .chains
            .iter()
            .find(|c| c.chain_id == self.config.chain_id)
            .and_then(|chain| {
                chain
                    .tokens
                    .iter()
                    .filter(|t| is_evm_address(&t.address))
                    .find(|t| t.address.eq_ignore_ascii_case(token_address))
            })
            .map(|t| TokenMeta { symbol: t.symbol.clone(), decimals: t.decimals });

        let meta = match from_registry {
            Some(meta) => meta,
            None => {
                let symbol = match rpc.eth_call(token_address, selectors::SYMBOL).await {
                    Ok(result) => {
                        let decoded = abi::decode_symbol(&result);
                        if decoded == "UNKNOWN" {
                            format!("TKN{}", &key[key.len() - 4..])
                        } else {
                            decoded
                        }
                    }
                    Err(_) => format!("TKN{}", &key[key.len() - 4..]),
                };
                let decimals = match rpc.eth_call(token_address, selectors::DECIMALS).await {
                    Ok(result) => abi::decode_uint(&result)
                        .ok()
                        .and_then(|v| u32::try_from(v).ok())
                        .filter(|v| *v <= 255)
                        .unwrap_or(18),
                    Err(_) => 18,
                };
                TokenMeta { symbol, decimals }
            }
        };

        self.caches.token_meta.insert(key, meta.clone());
        Ok(meta)
    }

    /// One synthetic mUSD→WETH swap, amount cycling so dashboards show
    /// movement on otherwise quiet chains.
    pub fn next_simulation_note(&mut self) -> DexTxRaw {
        self.simulation_counter += 1;
        let amount_in = Decimal::from(50 + (self.simulation_counter % 10) * 25);
        let amount_out = amount_in * Decimal::new(3, 4);
        let fee_usd = amount_in * Decimal::from(self.config.swap_fee_bps) / Decimal::from(10_000u32);
        let revenue = fee_usd * Decimal::from(self.config.protocol_revenue_share_bps)
            / Decimal::from(10_000u32);

        DexTxRaw {
            note_id: Uuid::new_v4().to_string(),
            correlation_id: Uuid::new_v4().to_string(),
            chain_id: self.config.chain_id,
            tx_hash: format!(
                "0x{}{}",
                Uuid::new_v4().simple(),
                &Uuid::new_v4().simple().to_string()[..32]
            ),
            action: NoteAction::Swap.to_string(),
            user_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
            pool_address: "0x1111111111111111111111111111111111111111".into(),
            token_in: "mUSD".into(),
            token_out: "WETH".into(),
            amount_in: amount_in.normalize().to_string(),
            amount_out: amount_out.normalize().to_string(),
            fee_usd: fee_usd.normalize().to_string(),
            gas_used: "117104".into(),
            gas_cost_usd: "0.22".into(),
            protocol_revenue_usd: revenue.normalize().to_string(),
            min_out: "0".into(),
            block_number: 0,
            occurred_at: Some(now_ts()),
            source: SOURCE_SIMULATION.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    fn test_config(rpc_url: &str) -> IndexerConfig {
        IndexerConfig {
            chain_key: "hardhat-local".into(),
            chain_id: 31337,
            rpc_url_override: Some(rpc_url.to_string()),
            pair_addresses_override: Some(vec![
                "0xaa00000000000000000000000000000000000001".into(),
            ]),
            stabilizer_addresses_override: None,
            poll_interval: Duration::from_secs(5),
            start_block: StartBlock::Number(100),
            confirmation_depth_override: Some(2),
            native_usd_price: Decimal::from(3300u32),
            swap_fee_bps: 30,
            protocol_revenue_share_bps: 4000,
            enable_simulation: false,
            simulation_interval: Duration::from_secs(30),
            registry_refresh: Duration::from_secs(60),
        }
    }

    fn test_indexer(rpc_url: &str) -> (tempfile::TempDir, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain-registry.generated.json");
        std::fs::write(&path, r#"{"version": 3, "generated_at": null, "chains": []}"#).unwrap();

        let mut settings = Settings::from_env();
        settings.kafka_bootstrap_servers = "127.0.0.1:1".into();
        let registry = Arc::new(RegistryCache::new(&path, Duration::from_secs(60)));
        let producer =
            tempo_runtime::kafka::producer(&settings.kafka_bootstrap_servers, "test-indexer")
                .unwrap();
        let mut indexer = Indexer::new(settings, test_config(rpc_url), registry, producer);
        indexer.refresh_watchlists();
        (dir, indexer)
    }

    #[test]
    fn test_note_id_is_deterministic_per_event() {
        let a = note_id_for_event(31337, "0xabc", 3, NoteAction::Swap);
        let b = note_id_for_event(31337, "0xabc", 3, NoteAction::Swap);
        let c = note_id_for_event(31337, "0xabc", 4, NoteAction::Swap);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let expected = Uuid::new_v5(&Uuid::NAMESPACE_URL, b"31337:0xabc:3:SWAP").to_string();
        assert_eq!(a, expected);
    }

    #[tokio::test]
    async fn test_cursor_advances_only_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_blockNumber"))
            .respond_with(rpc_result(serde_json::json!("0x6b")))  // head 107
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_getLogs"))
            .respond_with(rpc_result(serde_json::json!([])))
            .mount(&server)
            .await;

        let (_dir, mut indexer) = test_indexer(&server.uri());

        // head 107 - depth 2 = 105; start 100 → from = max(100, 105) = 105,
        // range [105, 105], cursor 106
        let published = indexer.run_once().await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(indexer.cursor, Some(106));

        // second pass: from 106 > latest 105 → no work, cursor unchanged
        indexer.run_once().await.unwrap();
        assert_eq!(indexer.cursor, Some(106));
    }

    #[tokio::test]
    async fn test_numeric_start_ahead_of_head_waits() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_blockNumber"))
            .respond_with(rpc_result(serde_json::json!("0x6b")))  // head 107
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("eth_getLogs"))
            .respond_with(rpc_result(serde_json::json!([])))
            .mount(&server)
            .await;

        let (_dir, mut indexer) = test_indexer(&server.uri());
        indexer.config.start_block = StartBlock::Number(200);

        // from = max(200, 105) = 200 > latest 105: nothing to poll yet and
        // the cursor must not move backwards to earlier blocks
        let published = indexer.run_once().await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(indexer.cursor, None);
    }

    #[tokio::test]
    async fn test_cursor_held_on_rpc_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1,
                "error": {"code": -32000, "message": "boom"}
            })))
            .mount(&server)
            .await;

        let (_dir, mut indexer) = test_indexer(&server.uri());
        assert!(indexer.run_once().await.is_err());
        assert_eq!(indexer.cursor, None);
    }

    #[test]
    fn test_swap_fee_fields_only_for_stable_in() {
        let server_unused = "http://127.0.0.1:1";
        let (_dir, indexer) = test_indexer(server_unused);

        let stable_in = DecodedEvent {
            action: NoteAction::Swap,
            user_address: String::new(),
            token_in: "mUSD".into(),
            token_out: "WETH".into(),
            amount_in: "100".into(),
            amount_out: "0.03".into(),
        };
        let (fee, revenue) = indexer.swap_fee_fields(&stable_in);
        assert_eq!(fee, "0.3");
        assert_eq!(revenue, "0.12");

        let other_in = DecodedEvent { token_in: "WETH".into(), ..stable_in };
        assert_eq!(indexer.swap_fee_fields(&other_in), ("0".into(), "0".into()));
    }

    #[test]
    fn test_simulation_notes_vary_and_tag_source() {
        let (_dir, mut indexer) = test_indexer("http://127.0.0.1:1");
        let first = indexer.next_simulation_note();
        let second = indexer.next_simulation_note();
        assert_eq!(first.source, SOURCE_SIMULATION);
        assert_ne!(first.note_id, second.note_id);
        assert_ne!(first.amount_in, second.amount_in);
        assert_eq!(first.action, "SWAP");
    }
}
