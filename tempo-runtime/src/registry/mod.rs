//! Chain registry snapshot: on-disk JSON produced by the registry builder,
//! consumed by the indexer, the quote engine, and the token/risk endpoints.
//!
//! The loader never fails: a missing or unparseable file yields an empty
//! snapshot. Readers receive an immutable `Arc<RegistrySnapshot>` swapped
//! atomically on refresh, so a cached snapshot can never be mutated through
//! a caller.

pub mod builder;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub chains: Vec<ChainEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChainEntry {
    #[serde(default)]
    pub chain_key: String,
    #[serde(default)]
    pub chain_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub network: String,
    #[serde(default)]
    pub rpc_env_key: String,
    #[serde(default)]
    pub default_rpc_url: String,
    #[serde(default)]
    pub amm: AmmConfig,
    #[serde(default)]
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub indexer: IndexerConfig,
    #[serde(default)]
    pub pairs: Vec<PairEntry>,
    #[serde(default)]
    pub network_health: NetworkHealth,
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
    #[serde(default)]
    pub trust_assumptions: Vec<Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub provenance: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmmConfig {
    #[serde(default = "default_swap_fee_bps")]
    pub swap_fee_bps: u32,
    #[serde(default = "default_protocol_fee_bps")]
    pub protocol_fee_bps: u32,
}

fn default_swap_fee_bps() -> u32 {
    30
}

fn default_protocol_fee_bps() -> u32 {
    5
}

impl Default for AmmConfig {
    fn default() -> Self {
        AmmConfig {
            swap_fee_bps: default_swap_fee_bps(),
            protocol_fee_bps: default_protocol_fee_bps(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ContractsConfig {
    #[serde(default)]
    pub musd: String,
    #[serde(default)]
    pub stabilizer: String,
    #[serde(default)]
    pub oracle: String,
    #[serde(default)]
    pub harmony_factory: String,
    #[serde(default)]
    pub harmony_router: String,
    #[serde(default)]
    pub resonance_vault: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndexerConfig {
    #[serde(default)]
    pub pair_addresses: Vec<String>,
    #[serde(default)]
    pub stabilizer_addresses: Vec<String>,
    #[serde(default)]
    pub vault_addresses: Vec<String>,
    #[serde(default)]
    pub start_block: Value,
    #[serde(default)]
    pub confirmation_depth: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PairEntry {
    #[serde(default)]
    pub pair_address: String,
    #[serde(default)]
    pub token0_address: String,
    #[serde(default)]
    pub token1_address: String,
    #[serde(default)]
    pub token0_symbol: String,
    #[serde(default)]
    pub token1_symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve0_raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve1_raw: Option<String>,
    #[serde(default = "default_reserve")]
    pub reserve0_decimal: String,
    #[serde(default = "default_reserve")]
    pub reserve1_decimal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserve_block_timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
}

fn default_reserve() -> String {
    "0".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkHealth {
    #[serde(default)]
    pub rpc_connected: bool,
    #[serde(default)]
    pub latest_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_pairs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_pair_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEntry {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default = "default_decimals")]
    pub decimals: u32,
    #[serde(default)]
    pub source: String,
}

fn default_decimals() -> u32 {
    18
}

/// EVM address shape used for executable-token filtering.
pub fn is_evm_address(value: &str) -> bool {
    let value = value.trim();
    value.len() == 42
        && value.starts_with("0x")
        && value[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Load a snapshot from disk; missing or invalid files become the empty
/// snapshot rather than an error.
pub fn load_snapshot(path: &Path) -> RegistrySnapshot {
    let Ok(text) = std::fs::read_to_string(path) else {
        return RegistrySnapshot::default();
    };
    serde_json::from_str(&text).unwrap_or_default()
}

struct CacheSlot {
    loaded_at: Option<Instant>,
    snapshot: Arc<RegistrySnapshot>,
}

/// TTL-refreshed registry view. Single writer (whoever hits the expiry),
/// many readers; readers always see a complete snapshot.
pub struct RegistryCache {
    path: PathBuf,
    ttl: Duration,
    slot: RwLock<CacheSlot>,
}

impl RegistryCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        RegistryCache {
            path: path.into(),
            ttl,
            slot: RwLock::new(CacheSlot {
                loaded_at: None,
                snapshot: Arc::new(RegistrySnapshot::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        {
            let slot = self.slot.read().expect("registry cache poisoned");
            if let Some(loaded_at) = slot.loaded_at {
                if loaded_at.elapsed() < self.ttl {
                    return Arc::clone(&slot.snapshot);
                }
            }
        }

        let fresh = Arc::new(load_snapshot(&self.path));
        let mut slot = self.slot.write().expect("registry cache poisoned");
        slot.snapshot = Arc::clone(&fresh);
        slot.loaded_at = Some(Instant::now());
        fresh
    }

    /// Drop the cached snapshot so the next `snapshot()` call re-reads disk.
    /// Used by tests and by the quote cache when its own TTL expires.
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().expect("registry cache poisoned");
        slot.loaded_at = None;
    }
}

fn token_priority(token: &TokenEntry) -> (i32, usize) {
    let address = token.address.trim();
    let source = token.source.trim().to_lowercase();

    let mut score = 0;
    if is_evm_address(address) {
        score += 4;
    }
    if source.starts_with("contracts") {
        score += 3;
    } else if source.starts_with("deployed") {
        score += 2;
    } else if source.starts_with("pair-discovery") {
        score += 1;
    } else if source.starts_with("defaults") {
        score -= 1;
    }

    // Prefer non-bridge placeholder addresses when a symbol is duplicated.
    if address.starts_with("bridge-") {
        score -= 2;
    }

    (score, address.len())
}

/// Deduplicate by UPPER symbol keeping the highest-priority entry, then sort
/// by UPPER symbol for deterministic output.
pub fn dedupe_tokens(tokens: &[TokenEntry]) -> Vec<TokenEntry> {
    let mut selected: BTreeMap<String, TokenEntry> = BTreeMap::new();
    for token in tokens {
        let symbol = token.symbol.trim();
        if symbol.is_empty() {
            continue;
        }
        let key = symbol.to_uppercase();
        match selected.get(&key) {
            Some(current) if token_priority(token) <= token_priority(current) => {}
            _ => {
                selected.insert(key, token.clone());
            }
        }
    }
    selected.into_values().collect()
}

/// Executable token list plus per-network summary rows, keyed for the
/// `/tokens` endpoint.
pub fn tokens_payload(snapshot: &RegistrySnapshot) -> Value {
    let mut tokens_by_chain = serde_json::Map::new();
    let mut networks: Vec<Value> = Vec::new();

    for chain in &snapshot.chains {
        if chain.chain_id <= 0 {
            continue;
        }
        let chain_id_key = chain.chain_id.to_string();
        let tokens = dedupe_tokens(&chain.tokens);

        networks.push(json!({
            "chain_id": chain.chain_id,
            "chain_key": chain.chain_key.clone(),
            "name": if chain.name.is_empty() { chain_id_key.clone() } else { chain.name.clone() },
            "network": chain.network.clone(),
            "token_count": tokens.len(),
            "pair_count": chain.pairs.len(),
            "router_address": chain.contracts.harmony_router.clone(),
            "factory_address": chain.contracts.harmony_factory.clone(),
            "vault_address": chain.contracts.resonance_vault.clone(),
            "protocol_fee_receiver": chain.contracts.resonance_vault.clone(),
            "musd_address": chain.contracts.musd.clone(),
            "stabilizer_address": chain.contracts.stabilizer.clone(),
            "swap_fee_bps": chain.amm.swap_fee_bps,
            "protocol_fee_bps": chain.amm.protocol_fee_bps,
            "rpc_connected": chain.network_health.rpc_connected,
            "latest_checked_block": chain.network_health.latest_block,
        }));

        tokens_by_chain.insert(chain_id_key, serde_json::to_value(tokens).unwrap_or_default());
    }

    networks.sort_by_key(|n| n.get("chain_id").and_then(Value::as_i64).unwrap_or(0));

    json!({
        "chains": Value::Object(tokens_by_chain),
        "networks": networks,
        "registry_version": snapshot.version,
        "generated_at": snapshot.generated_at,
    })
}

/// Trust-assumption list for one chain, or `None` when the chain is unknown.
pub fn risk_assumptions_payload(snapshot: &RegistrySnapshot, chain_id: i64) -> Option<Value> {
    let chain = snapshot.chains.iter().find(|c| c.chain_id == chain_id)?;
    Some(json!({
        "chain_id": chain_id,
        "chain_key": chain.chain_key.clone(),
        "chain_name": if chain.name.is_empty() { chain_id.to_string() } else { chain.name.clone() },
        "assumptions": chain.trust_assumptions.clone(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(symbol: &str, address: &str, source: &str) -> TokenEntry {
        TokenEntry {
            symbol: symbol.into(),
            name: symbol.into(),
            address: address.into(),
            decimals: 18,
            source: source.into(),
        }
    }

    #[test]
    fn test_is_evm_address() {
        assert!(is_evm_address("0xfff9976782d46cc05630d1f6ebab18b2324d6b14"));
        assert!(!is_evm_address("bridge-wbtc"));
        assert!(!is_evm_address("0x123"));
        assert!(!is_evm_address("0xzz0000000000000000000000000000000000zzzz"));
    }

    #[test]
    fn test_dedupe_prefers_contracts_over_defaults() {
        let tokens = vec![
            token("WETH", "0xfff9976782d46cc05630d1f6ebab18b2324d6b14", "defaults"),
            token("weth", "0x1111111111111111111111111111111111111111", "contracts.tokenA"),
        ];
        let deduped = dedupe_tokens(&tokens);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].source, "contracts.tokenA");
    }

    #[test]
    fn test_dedupe_penalizes_bridge_placeholders() {
        let tokens = vec![
            token("wBTC", "bridge-wbtc-placeholder-address-000000000000", "pair-discovery"),
            token("WBTC", "0x2222222222222222222222222222222222222222", "pair-discovery"),
        ];
        let deduped = dedupe_tokens(&tokens);
        assert_eq!(deduped.len(), 1);
        assert!(deduped[0].address.starts_with("0x"));
    }

    #[test]
    fn test_dedupe_sorts_by_upper_symbol() {
        let tokens = vec![
            token("wsol", "0x3333333333333333333333333333333333333333", "deployed.targets"),
            token("MUSD", "0x1111111111111111111111111111111111111111", "contracts.musd"),
            token("WETH", "0x2222222222222222222222222222222222222222", "contracts.tokenA"),
        ];
        let symbols: Vec<String> = dedupe_tokens(&tokens).iter().map(|t| t.symbol.clone()).collect();
        assert_eq!(symbols, vec!["MUSD", "WETH", "wsol"]);
    }

    #[test]
    fn test_load_snapshot_missing_file_is_empty() {
        let snapshot = load_snapshot(Path::new("/nonexistent/registry.json"));
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.chains.is_empty());
    }

    #[test]
    fn test_load_snapshot_invalid_json_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain-registry.generated.json");
        std::fs::write(&path, "{not json").unwrap();
        let snapshot = load_snapshot(&path);
        assert_eq!(snapshot.version, 0);
        assert!(snapshot.chains.is_empty());
    }

    #[test]
    fn test_cache_invalidate_forces_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain-registry.generated.json");
        std::fs::write(&path, r#"{"version": 1, "generated_at": null, "chains": []}"#).unwrap();

        let cache = RegistryCache::new(&path, Duration::from_secs(3600));
        assert_eq!(cache.snapshot().version, 1);

        std::fs::write(&path, r#"{"version": 2, "generated_at": null, "chains": []}"#).unwrap();
        // still cached
        assert_eq!(cache.snapshot().version, 1);
        cache.invalidate();
        assert_eq!(cache.snapshot().version, 2);
    }

    #[test]
    fn test_tokens_payload_shapes_networks() {
        let snapshot = RegistrySnapshot {
            version: 3,
            generated_at: Some("2026-02-18T00:00:00+00:00".into()),
            source: None,
            chains: vec![ChainEntry {
                chain_key: "bnb-testnet".into(),
                chain_id: 97,
                name: "BNB Chain Testnet".into(),
                network: "bscTestnet".into(),
                tokens: vec![token("mUSD", "0x1111111111111111111111111111111111111111", "contracts.musd")],
                ..ChainEntry::default()
            }],
        };
        let payload = tokens_payload(&snapshot);
        assert!(payload["chains"]["97"].is_array());
        assert_eq!(payload["networks"][0]["chain_key"], "bnb-testnet");
        assert_eq!(payload["registry_version"], 3);
    }

    #[test]
    fn test_risk_assumptions_unknown_chain_is_none() {
        let snapshot = RegistrySnapshot::default();
        assert!(risk_assumptions_payload(&snapshot, 999_999).is_none());
    }
}
