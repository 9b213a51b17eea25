//! Offline registry builder: assembles the chain registry snapshot from the
//! deployed-address registries, live factory pair discovery over JSON-RPC,
//! and layered fallbacks (previous snapshot, pair seeds, deployed targets).
//!
//! A run never fails hard: per-chain failures land in `network_health` and
//! the best available pair set is kept.

use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::decimal::scale_base_units;
use crate::error::TempoError;
use crate::registry::{
    AmmConfig, ChainEntry, ContractsConfig, IndexerConfig, NetworkHealth, PairEntry,
    RegistrySnapshot, TokenEntry, is_evm_address,
};
use crate::rpc::{EvmRpcClient, abi, selectors};
use crate::settings::env_parse;

pub const REGISTRY_VERSION: u64 = 3;

const SNAPSHOT_SOURCE: &str = "packages/contracts/deploy/address-registry.*.json + live-rpc-pair-discovery + optional pair-seeds.*.json fallback";

#[derive(Debug, Clone)]
pub struct ChainSpec {
    pub network: String,
    pub chain_key: String,
    pub chain_id: i64,
    pub name: String,
    pub rpc_env_key: String,
    pub default_rpc_url: String,
    pub confirmation_depth: u64,
}

/// The statically supported chains. Discovery is attempted for each; chains
/// whose RPC is unreachable keep their fallback pair set.
pub fn chain_specs() -> Vec<ChainSpec> {
    vec![
        ChainSpec {
            network: "hardhat".into(),
            chain_key: "hardhat-local".into(),
            chain_id: 31337,
            name: "Hardhat Local".into(),
            rpc_env_key: "INDEXER_HARDHAT_RPC_URL".into(),
            default_rpc_url: "http://host.docker.internal:8545".into(),
            confirmation_depth: 0,
        },
        ChainSpec {
            network: "sepolia".into(),
            chain_key: "ethereum-sepolia".into(),
            chain_id: 11155111,
            name: "Ethereum Sepolia".into(),
            rpc_env_key: "SEPOLIA_RPC_URL".into(),
            default_rpc_url: "https://ethereum-sepolia-rpc.publicnode.com".into(),
            confirmation_depth: 2,
        },
        ChainSpec {
            network: "bscTestnet".into(),
            chain_key: "bnb-testnet".into(),
            chain_id: 97,
            name: "BNB Chain Testnet".into(),
            rpc_env_key: "BSC_TESTNET_RPC_URL".into(),
            default_rpc_url: "https://bsc-testnet-rpc.publicnode.com".into(),
            confirmation_depth: 3,
        },
    ]
}

fn canonical_wrapped_tokens(chain_key: &str) -> Vec<TokenEntry> {
    match chain_key {
        "ethereum-sepolia" => vec![token_entry(
            "WETH",
            "Wrapped Ether",
            18,
            "0xfff9976782d46cc05630d1f6ebab18b2324d6b14",
            "defaults",
        )],
        "bnb-testnet" => vec![token_entry(
            "WBNB",
            "Wrapped BNB",
            18,
            "0xae13d989dac2f0debff460ac112a837c89baa7cd",
            "defaults",
        )],
        _ => Vec::new(),
    }
}

fn static_chain_tokens(chain_key: &str) -> Vec<TokenEntry> {
    match chain_key {
        "bnb-testnet" => vec![token_entry(
            "MODX",
            "modX Token",
            18,
            "0xB6322eD8561604Ca2A1b9c17e4d02B957EB242fe",
            "static",
        )],
        _ => Vec::new(),
    }
}

fn token_entry(symbol: &str, name: &str, decimals: u32, address: &str, source: &str) -> TokenEntry {
    TokenEntry {
        symbol: symbol.to_string(),
        name: name.to_string(),
        address: address.to_string(),
        decimals,
        source: source.to_string(),
    }
}

fn fallback_symbol(address: &str) -> String {
    let tail: String = address
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("TKN{tail}")
}

pub struct RegistryBuilder {
    deploy_dir: PathBuf,
    out_path: PathBuf,
    max_pairs: usize,
}

struct DiscoveryOutcome {
    pair_addresses: Vec<String>,
    pairs: Vec<PairEntry>,
    health: NetworkHealth,
}

impl RegistryBuilder {
    pub fn new(deploy_dir: impl Into<PathBuf>, out_path: impl Into<PathBuf>) -> Self {
        RegistryBuilder {
            deploy_dir: deploy_dir.into(),
            out_path: out_path.into(),
            max_pairs: env_parse("PAIR_DISCOVERY_MAX_PAIRS", 200usize),
        }
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub async fn build(&self) -> RegistrySnapshot {
        self.build_with_specs(&chain_specs()).await
    }

    pub async fn build_with_specs(&self, specs: &[ChainSpec]) -> RegistrySnapshot {
        let deployed = self.read_deployed_registries();
        let previous = self.read_previous_generated();
        let generated_at = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false);

        let mut chains = Vec::with_capacity(specs.len());
        for spec in specs {
            let chain = self
                .build_chain(spec, &deployed, previous.get(&spec.chain_key), &generated_at)
                .await;
            chains.push(chain);
        }

        RegistrySnapshot {
            version: REGISTRY_VERSION,
            generated_at: Some(generated_at),
            source: Some(SNAPSHOT_SOURCE.to_string()),
            chains,
        }
    }

    async fn build_chain(
        &self,
        spec: &ChainSpec,
        deployed: &HashMap<String, Value>,
        previous_chain: Option<&ChainEntry>,
        generated_at: &str,
    ) -> ChainEntry {
        let deployed_entry = deployed.get(&spec.network).cloned().unwrap_or(Value::Null);
        let (seed_tokens, seed_pairs) = self.read_pair_seed(&spec.network);
        let target_pairs = target_pairs_from_registry(&deployed_entry, generated_at);

        let contracts_raw = deployed_entry.get("contracts").cloned().unwrap_or(Value::Null);
        let fees = deployed_entry.get("fees").cloned().unwrap_or(Value::Null);

        let stabilizer = str_field(&contracts_raw, "stabilizer");
        let resonance_vault = str_field(&contracts_raw, "resonanceVault");

        let swap_fee_bps = fee_bps(&fees, "swapFeeBps", "SWAP_FEE_BPS", 30);
        let protocol_fee_bps = fee_bps(&fees, "protocolFeeBps", "PROTOCOL_FEE_BPS", 5);

        let mut chain = ChainEntry {
            chain_key: spec.chain_key.clone(),
            chain_id: spec.chain_id,
            name: spec.name.clone(),
            network: spec.network.clone(),
            rpc_env_key: spec.rpc_env_key.clone(),
            default_rpc_url: spec.default_rpc_url.clone(),
            amm: AmmConfig {
                swap_fee_bps,
                protocol_fee_bps,
            },
            contracts: ContractsConfig {
                musd: str_field(&contracts_raw, "musd"),
                stabilizer: stabilizer.clone(),
                oracle: str_field(&contracts_raw, "oracle"),
                harmony_factory: str_field(&contracts_raw, "harmonyFactory"),
                harmony_router: str_field(&contracts_raw, "harmonyRouter"),
                resonance_vault: resonance_vault.clone(),
            },
            indexer: IndexerConfig {
                pair_addresses: Vec::new(),
                stabilizer_addresses: if is_evm_address(&stabilizer) {
                    vec![stabilizer]
                } else {
                    Vec::new()
                },
                vault_addresses: if is_evm_address(&resonance_vault) {
                    vec![resonance_vault]
                } else {
                    Vec::new()
                },
                start_block: Value::String("latest".into()),
                confirmation_depth: spec.confirmation_depth,
            },
            pairs: Vec::new(),
            network_health: NetworkHealth {
                rpc_connected: false,
                latest_block: None,
                checked_at: Some(generated_at.to_string()),
                discovery_status: Some("not-started".into()),
                ..NetworkHealth::default()
            },
            tokens: resolve_tokens(spec, &contracts_raw, &deployed_entry),
            trust_assumptions: trust_assumptions(&spec.chain_key, generated_at),
            provenance: serde_json::json!({
                "deployed_registry_file": if deployed_entry.is_null() {
                    Value::Null
                } else {
                    Value::String(format!("address-registry.{}.json", spec.network))
                },
            }),
        };

        let rpc_url = std::env::var(&spec.rpc_env_key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| spec.default_rpc_url.clone());

        if rpc_url.is_empty() {
            apply_fallback(
                &mut chain,
                previous_chain,
                &seed_tokens,
                &seed_pairs,
                &target_pairs,
                generated_at,
                "rpc-url-missing",
            );
            return chain;
        }

        let rpc = EvmRpcClient::new(&rpc_url);
        let factory = chain.contracts.harmony_factory.clone();
        match self
            .discover_pairs(&rpc, &factory, &mut chain.tokens, generated_at)
            .await
        {
            Ok(outcome) => {
                let filtered = filter_evm_pairs(outcome.pairs);
                chain.indexer.pair_addresses =
                    filtered.iter().map(|p| p.pair_address.clone()).collect();
                chain.pairs = filtered;
                chain.network_health = outcome.health;
            }
            Err(err) => {
                tracing::warn!(
                    chain_key = %spec.chain_key,
                    error = %err,
                    "pair discovery failed, applying fallback"
                );
                apply_fallback(
                    &mut chain,
                    previous_chain,
                    &seed_tokens,
                    &seed_pairs,
                    &target_pairs,
                    generated_at,
                    &err.to_string(),
                );
            }
        }

        chain
    }

    async fn discover_pairs(
        &self,
        rpc: &EvmRpcClient,
        factory_address: &str,
        token_book: &mut Vec<TokenEntry>,
        checked_at: &str,
    ) -> Result<DiscoveryOutcome, TempoError> {
        let latest_block = rpc.block_number().await?;
        let mut health = NetworkHealth {
            rpc_connected: true,
            latest_block: Some(latest_block),
            checked_at: Some(checked_at.to_string()),
            ..NetworkHealth::default()
        };

        if !is_evm_address(factory_address) {
            health.discovery_status = Some("factory-not-configured".into());
            return Ok(DiscoveryOutcome {
                pair_addresses: Vec::new(),
                pairs: Vec::new(),
                health,
            });
        }

        let length_hex = rpc
            .eth_call(factory_address, selectors::ALL_PAIRS_LENGTH)
            .await?;
        let all_pairs_length = abi::decode_uint(&length_hex)?;
        let discover_count = usize::try_from(all_pairs_length)
            .unwrap_or(usize::MAX)
            .min(self.max_pairs);

        let mut token_by_address: HashMap<String, usize> = token_book
            .iter()
            .enumerate()
            .filter(|(_, t)| is_evm_address(&t.address))
            .map(|(i, t)| (t.address.to_lowercase(), i))
            .collect();

        let mut pair_addresses = Vec::new();
        let mut pairs = Vec::new();

        for index in 0..discover_count {
            let data = format!("{}{}", selectors::ALL_PAIRS, abi::encode_uint256(index as u64));
            let pair_address = abi::decode_address(&rpc.eth_call(factory_address, &data).await?)?;
            if !is_evm_address(&pair_address) {
                continue;
            }

            let token0_address =
                abi::decode_address(&rpc.eth_call(&pair_address, selectors::TOKEN0).await?)?;
            let token1_address =
                abi::decode_address(&rpc.eth_call(&pair_address, selectors::TOKEN1).await?)?;
            let reserves_hex = rpc.eth_call(&pair_address, selectors::GET_RESERVES).await?;

            let reserves_body = reserves_hex.trim().trim_start_matches("0x").to_string();
            let reserves_body = format!("{reserves_body:0>192}");
            let reserve0_raw = abi::decode_uint(&format!("0x{}", &reserves_body[0..64]))?;
            let reserve1_raw = abi::decode_uint(&format!("0x{}", &reserves_body[64..128]))?;
            let reserve_timestamp = abi::decode_uint(&format!("0x{}", &reserves_body[128..192]))?;

            let token0_idx =
                self.ensure_token(rpc, token_book, &mut token_by_address, &token0_address).await;
            let token1_idx =
                self.ensure_token(rpc, token_book, &mut token_by_address, &token1_address).await;

            let (symbol0, decimals0) = (
                token_book[token0_idx].symbol.clone(),
                token_book[token0_idx].decimals,
            );
            let (symbol1, decimals1) = (
                token_book[token1_idx].symbol.clone(),
                token_book[token1_idx].decimals,
            );

            pairs.push(PairEntry {
                pair_address: pair_address.clone(),
                token0_address,
                token1_address,
                token0_symbol: symbol0,
                token1_symbol: symbol1,
                reserve0_raw: Some(reserve0_raw.to_string()),
                reserve1_raw: Some(reserve1_raw.to_string()),
                reserve0_decimal: scale_base_units(&reserve0_raw.to_string(), decimals0),
                reserve1_decimal: scale_base_units(&reserve1_raw.to_string(), decimals1),
                reserve_block_timestamp: u64::try_from(reserve_timestamp).ok(),
                checked_at: Some(checked_at.to_string()),
            });
            pair_addresses.push(pair_address);
        }

        health.discovery_status = Some("ok".into());
        health.discovered_pairs = Some(pair_addresses.len());
        health.factory_address = Some(factory_address.to_string());
        Ok(DiscoveryOutcome {
            pair_addresses,
            pairs,
            health,
        })
    }

    /// Look up a token by address in the book, querying `symbol()` and
    /// `decimals()` for unknown ones (defaulting on failure).
    async fn ensure_token(
        &self,
        rpc: &EvmRpcClient,
        token_book: &mut Vec<TokenEntry>,
        token_by_address: &mut HashMap<String, usize>,
        address: &str,
    ) -> usize {
        let key = address.to_lowercase();
        if let Some(idx) = token_by_address.get(&key) {
            return *idx;
        }

        let symbol = match rpc.eth_call(address, selectors::SYMBOL).await {
            Ok(result) => {
                let decoded = abi::decode_symbol(&result);
                if decoded == "UNKNOWN" { fallback_symbol(address) } else { decoded }
            }
            Err(_) => fallback_symbol(address),
        };
        let decimals = match rpc.eth_call(address, selectors::DECIMALS).await {
            Ok(result) => abi::decode_uint(&result)
                .ok()
                .and_then(|v| u32::try_from(v).ok())
                .filter(|v| *v <= 255)
                .unwrap_or(18),
            Err(_) => 18,
        };

        let tail: String = {
            let chars: Vec<char> = address.chars().collect();
            chars[chars.len().saturating_sub(6)..].iter().collect()
        };
        let name = format!("Discovered token {tail}");
        token_book.push(TokenEntry {
            symbol,
            name,
            address: address.to_string(),
            decimals,
            source: "pair-discovery".into(),
        });
        let idx = token_book.len() - 1;
        token_by_address.insert(key, idx);
        idx
    }

    fn read_deployed_registries(&self) -> HashMap<String, Value> {
        let mut found = HashMap::new();
        let Ok(entries) = std::fs::read_dir(&self.deploy_dir) else {
            return found;
        };
        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("address-registry.") && n.ends_with(".json"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        for path in paths {
            let Ok(text) = std::fs::read_to_string(&path) else {
                continue;
            };
            let Ok(payload) = serde_json::from_str::<Value>(&text) else {
                continue;
            };
            let network = str_field(&payload, "network");
            if !network.is_empty() {
                found.insert(network, payload);
            }
        }
        found
    }

    fn read_previous_generated(&self) -> HashMap<String, ChainEntry> {
        let mut previous = HashMap::new();
        let Ok(text) = std::fs::read_to_string(&self.out_path) else {
            return previous;
        };
        let Ok(snapshot) = serde_json::from_str::<RegistrySnapshot>(&text) else {
            return previous;
        };
        for chain in snapshot.chains {
            if !chain.chain_key.is_empty() {
                previous.insert(chain.chain_key.clone(), chain);
            }
        }
        previous
    }

    fn read_pair_seed(&self, network: &str) -> (Vec<TokenEntry>, Vec<PairEntry>) {
        let seed_path = self.deploy_dir.join(format!("pair-seeds.{network}.json"));
        let Ok(text) = std::fs::read_to_string(&seed_path) else {
            return (Vec::new(), Vec::new());
        };
        let Ok(payload) = serde_json::from_str::<Value>(&text) else {
            return (Vec::new(), Vec::new());
        };

        let tokens = payload
            .get("tokens")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|t| serde_json::from_value::<TokenEntry>(t.clone()).ok())
                    .filter(|t| is_evm_address(&t.address))
                    .collect()
            })
            .unwrap_or_default();

        let pairs = payload
            .get("pairs")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|p| serde_json::from_value::<PairEntry>(p.clone()).ok())
                    .collect::<Vec<_>>()
            })
            .map(filter_evm_pairs)
            .unwrap_or_default();

        (tokens, pairs)
    }

    /// Atomically write the snapshot: temp file in the target directory, then
    /// rename over the previous version.
    pub fn write(&self, snapshot: &RegistrySnapshot) -> Result<PathBuf, TempoError> {
        if let Some(parent) = self.out_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TempoError::Registry(format!("create {}: {e}", parent.display())))?;
        }
        let body = serde_json::to_string_pretty(snapshot)? + "\n";
        let tmp_path = self.out_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, body)
            .map_err(|e| TempoError::Registry(format!("write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &self.out_path)
            .map_err(|e| TempoError::Registry(format!("rename {}: {e}", self.out_path.display())))?;
        Ok(self.out_path.clone())
    }
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn fee_bps(fees: &Value, key: &str, env_key: &str, default: u32) -> u32 {
    if let Some(v) = fees.get(key) {
        if let Some(n) = v.as_u64() {
            return n as u32;
        }
        if let Some(s) = v.as_str() {
            if let Ok(n) = s.parse::<u32>() {
                return n;
            }
        }
    }
    env_parse(env_key, default)
}

fn resolve_tokens(spec: &ChainSpec, contracts: &Value, deployed_entry: &Value) -> Vec<TokenEntry> {
    let musd = str_or(contracts, "musd", "unconfigured-musd");

    let mut tokens = if spec.chain_key == "hardhat-local" {
        let token_a = str_or(contracts, "tokenA", "local-weth");
        let token_b = str_or(contracts, "tokenB", "local-wbtc");
        let collateral = str_or(contracts, "collateral", "local-usdc");
        vec![
            token_entry("mUSD", "Musical USD", 18, &musd, "contracts.musd"),
            token_entry("USDC", "USD Coin (local collateral)", 6, &collateral, "contracts.collateral"),
            token_entry("WETH", "Wrapped Ether", 18, &token_a, "contracts.tokenA"),
            token_entry("WBTC", "Wrapped Bitcoin", 8, &token_b, "contracts.tokenB"),
        ]
    } else {
        let mut tokens = vec![token_entry("mUSD", "Musical USD", 18, &musd, "contracts.musd")];
        tokens.extend(
            canonical_wrapped_tokens(&spec.chain_key)
                .into_iter()
                .filter(|t| is_evm_address(&t.address)),
        );
        tokens.extend(
            static_chain_tokens(&spec.chain_key)
                .into_iter()
                .filter(|t| is_evm_address(&t.address)),
        );
        tokens
    };

    append_configured_tokens(&mut tokens, deployed_entry, "collaterals", "collateral");
    append_configured_tokens(&mut tokens, deployed_entry, "targets", "target");
    tokens
}

fn str_or(value: &Value, key: &str, default: &str) -> String {
    let v = str_field(value, key);
    if v.is_empty() { default.to_string() } else { v }
}

/// Append `collaterals` / `targets` entries from the deploy registry that are
/// not already in the token book (by address).
fn append_configured_tokens(tokens: &mut Vec<TokenEntry>, deployed_entry: &Value, key: &str, role: &str) {
    let Some(configured) = deployed_entry.get(key).and_then(Value::as_array) else {
        return;
    };

    let mut existing: std::collections::HashSet<String> = tokens
        .iter()
        .filter(|t| is_evm_address(&t.address))
        .map(|t| t.address.to_lowercase())
        .collect();

    for item in configured {
        let address = str_field(item, "token");
        if !is_evm_address(&address) {
            continue;
        }
        let address_lower = address.to_lowercase();
        if existing.contains(&address_lower) {
            continue;
        }
        let symbol = {
            let s = str_field(item, "symbol");
            if s.is_empty() { fallback_symbol(&address) } else { s }
        };
        let decimals = item
            .get("decimals")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(18);
        tokens.push(token_entry(
            &symbol,
            &format!("{symbol} {role}"),
            decimals,
            &address,
            &format!("deployed.{key}"),
        ));
        existing.insert(address_lower);
    }
}

/// Zero-reserve mUSD pairs synthesized from the deploy registry's `targets`;
/// used only in fallback merges so the indexer still has pair addresses.
fn target_pairs_from_registry(deployed_entry: &Value, checked_at: &str) -> Vec<PairEntry> {
    let Some(configured) = deployed_entry.get("targets").and_then(Value::as_array) else {
        return Vec::new();
    };
    let musd = str_field(
        &deployed_entry.get("contracts").cloned().unwrap_or(Value::Null),
        "musd",
    );
    if !is_evm_address(&musd) {
        return Vec::new();
    }

    let mut output = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for item in configured {
        let pair_address = str_field(item, "pair");
        let token_address = str_field(item, "token");
        if !(is_evm_address(&pair_address) && is_evm_address(&token_address)) {
            continue;
        }
        if !seen.insert(pair_address.to_lowercase()) {
            continue;
        }
        let symbol = {
            let s = str_field(item, "symbol");
            if s.is_empty() { fallback_symbol(&token_address) } else { s }
        };
        output.push(PairEntry {
            pair_address,
            token0_address: musd.clone(),
            token1_address: token_address,
            token0_symbol: "mUSD".into(),
            token1_symbol: symbol,
            reserve0_raw: None,
            reserve1_raw: None,
            reserve0_decimal: "0".into(),
            reserve1_decimal: "0".into(),
            reserve_block_timestamp: None,
            checked_at: Some(checked_at.to_string()),
        });
    }
    output
}

fn filter_evm_pairs(pairs: Vec<PairEntry>) -> Vec<PairEntry> {
    pairs
        .into_iter()
        .filter(|p| {
            is_evm_address(&p.pair_address)
                && is_evm_address(&p.token0_address)
                && is_evm_address(&p.token1_address)
        })
        .collect()
}

/// Merge two pair lists by lowercase pair address; entries from `secondary`
/// win on collision.
fn merge_pair_lists(primary: &[PairEntry], secondary: &[PairEntry]) -> Vec<PairEntry> {
    let mut merged: Vec<PairEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for pair in primary.iter().chain(secondary.iter()) {
        let key = pair.pair_address.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }
        match index.get(&key) {
            Some(i) => merged[*i] = pair.clone(),
            None => {
                index.insert(key, merged.len());
                merged.push(pair.clone());
            }
        }
    }
    merged
}

/// Merge token lists by lowercase address; `previous` entries win, matching
/// the original snapshot-repair behavior.
fn merge_tokens_with_previous(current: &[TokenEntry], previous: &[TokenEntry]) -> Vec<TokenEntry> {
    let mut merged: Vec<TokenEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for token in current.iter().chain(previous.iter()) {
        if !is_evm_address(token.address.trim()) {
            continue;
        }
        let key = token.address.trim().to_lowercase();
        match index.get(&key) {
            Some(i) => merged[*i] = token.clone(),
            None => {
                index.insert(key, merged.len());
                merged.push(token.clone());
            }
        }
    }
    merged
}

fn env_chain_or_global(name: &str, chain_key: &str, default: &str) -> String {
    let suffix = chain_key.to_uppercase().replace('-', "_");
    std::env::var(format!("{name}_{suffix}"))
        .or_else(|_| std::env::var(name))
        .unwrap_or_else(|_| default.to_string())
}

fn trust_assumptions(chain_key: &str, checked_at: &str) -> Vec<Value> {
    let native_provider = env_chain_or_global(
        "MUSD_POLICY_PROVIDER",
        chain_key,
        "mCryptoEx governance + oracle section",
    );
    let btc_provider = env_chain_or_global("BRIDGE_PROVIDER_WBTC", chain_key, "provider-not-declared");
    let sol_provider = env_chain_or_global("BRIDGE_PROVIDER_WSOL", chain_key, "provider-not-declared");
    let btc_attested = env_chain_or_global("BRIDGE_LAST_ATTESTED_AT_WBTC", chain_key, "");
    let sol_attested = env_chain_or_global("BRIDGE_LAST_ATTESTED_AT_WSOL", chain_key, "");

    vec![
        serde_json::json!({
            "endpoint": "native-musd-policy",
            "asset_symbol": "mUSD",
            "category": "native",
            "risk_level": "medium",
            "bridge_provider": native_provider,
            "last_attested_at": Value::Null,
            "last_checked_at": checked_at,
            "statement": "Depends on Stabilizer collateral policy, oracle integrity, and governance controls.",
        }),
        serde_json::json!({
            "endpoint": "wrapped-btc-evm",
            "asset_symbol": "wBTC",
            "category": "wrapped",
            "risk_level": "high",
            "bridge_provider": btc_provider,
            "last_attested_at": if btc_attested.is_empty() { Value::Null } else { Value::String(btc_attested) },
            "last_checked_at": checked_at,
            "statement": "Bridge/custodian solvency and redeemability are external trust dependencies.",
        }),
        serde_json::json!({
            "endpoint": "wrapped-sol-evm",
            "asset_symbol": "wSOL",
            "category": "wrapped",
            "risk_level": "high",
            "bridge_provider": sol_provider,
            "last_attested_at": if sol_attested.is_empty() { Value::Null } else { Value::String(sol_attested) },
            "last_checked_at": checked_at,
            "statement": "Wrapped SOL representation depends on bridge contract and message relayer security.",
        }),
    ]
}

/// Replace a chain's pairs with the merged fallback set and tag
/// `network_health` with the failure cause and the fallback sources used.
fn apply_fallback(
    chain: &mut ChainEntry,
    previous_chain: Option<&ChainEntry>,
    seed_tokens: &[TokenEntry],
    seed_pairs: &[PairEntry],
    target_pairs: &[PairEntry],
    generated_at: &str,
    cause: &str,
) {
    let previous_pairs = previous_chain.map(|c| c.pairs.as_slice()).unwrap_or_default();

    let fallback_pairs = merge_pair_lists(previous_pairs, seed_pairs);
    let fallback_pairs = merge_pair_lists(target_pairs, &fallback_pairs);

    let mut source_parts = Vec::new();
    if !previous_pairs.is_empty() {
        source_parts.push("previous");
    }
    if !seed_pairs.is_empty() {
        source_parts.push("seed");
    }
    if !target_pairs.is_empty() {
        source_parts.push("targets");
    }
    let fallback_source = if source_parts.is_empty() {
        "none".to_string()
    } else {
        source_parts.join("+")
    };

    if !seed_tokens.is_empty() {
        chain.tokens = merge_tokens_with_previous(&chain.tokens, seed_tokens);
    }

    if fallback_pairs.is_empty() {
        chain.network_health = NetworkHealth {
            rpc_connected: false,
            latest_block: None,
            checked_at: Some(generated_at.to_string()),
            discovery_status: Some(if cause == "rpc-url-missing" {
                cause.to_string()
            } else {
                format!("error: {cause}")
            }),
            ..NetworkHealth::default()
        };
        return;
    }

    if let Some(previous) = previous_chain {
        chain.tokens = merge_tokens_with_previous(&chain.tokens, &previous.tokens);
    }
    let filtered = filter_evm_pairs(fallback_pairs);
    chain.indexer.pair_addresses = filtered.iter().map(|p| p.pair_address.clone()).collect();
    chain.network_health = NetworkHealth {
        rpc_connected: false,
        latest_block: None,
        checked_at: Some(generated_at.to_string()),
        discovery_status: Some(format!("fallback-{fallback_source}: {cause}")),
        fallback_pair_count: Some(filtered.len()),
        ..NetworkHealth::default()
    };
    chain.pairs = filtered;
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn word_address(address: &str) -> String {
        format!("0x{:0>64}", address.trim_start_matches("0x"))
    }

    fn rpc_result(result: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .set_body_json(serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": result}))
    }

    const MUSD: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const TOKEN_A: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const FACTORY: &str = "0xcccccccccccccccccccccccccccccccccccccccc";
    const PAIR: &str = "0xdddddddddddddddddddddddddddddddddddddddd";

    fn hardhat_spec(rpc_url: &str, rpc_env_key: &str) -> ChainSpec {
        ChainSpec {
            network: "hardhat".into(),
            chain_key: "hardhat-local".into(),
            chain_id: 31337,
            name: "Hardhat Local".into(),
            rpc_env_key: rpc_env_key.into(),
            default_rpc_url: rpc_url.into(),
            confirmation_depth: 0,
        }
    }

    fn write_deploy_registry(dir: &Path) {
        let payload = serde_json::json!({
            "network": "hardhat",
            "contracts": {
                "musd": MUSD,
                "tokenA": TOKEN_A,
                "tokenB": "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee",
                "collateral": "0xffffffffffffffffffffffffffffffffffffffff",
                "harmonyFactory": FACTORY,
                "harmonyRouter": "0x9999999999999999999999999999999999999999",
                "resonanceVault": "0x8888888888888888888888888888888888888888",
                "stabilizer": "0x7777777777777777777777777777777777777777",
                "oracle": "0x6666666666666666666666666666666666666666"
            },
            "fees": {"swapFeeBps": 30, "protocolFeeBps": 5}
        });
        std::fs::write(
            dir.join("address-registry.hardhat.json"),
            serde_json::to_string_pretty(&payload).unwrap(),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_discovery_builds_pairs_and_health() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("eth_blockNumber"))
            .respond_with(rpc_result("0x10"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(selectors::ALL_PAIRS_LENGTH))
            .respond_with(rpc_result(&format!("0x{}", abi::encode_uint256(1))))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(selectors::ALL_PAIRS))
            .respond_with(rpc_result(&word_address(PAIR)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(selectors::TOKEN0))
            .respond_with(rpc_result(&word_address(MUSD)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains(selectors::TOKEN1))
            .respond_with(rpc_result(&word_address(TOKEN_A)))
            .mount(&server)
            .await;
        // reserve0 = 5e18, reserve1 = 2e18, block timestamp 1700000000
        let reserves = format!(
            "0x{}{}{}",
            abi::encode_uint256(5_000_000_000_000_000_000),
            abi::encode_uint256(2_000_000_000_000_000_000),
            abi::encode_uint256(1_700_000_000),
        );
        Mock::given(method("POST"))
            .and(body_string_contains(selectors::GET_RESERVES))
            .respond_with(rpc_result(&reserves))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        write_deploy_registry(dir.path());
        let out = dir.path().join("chain-registry.generated.json");
        let builder = RegistryBuilder::new(dir.path(), &out);

        let spec = hardhat_spec(&server.uri(), "TEST_DISCOVERY_RPC_URL_UNSET");
        let snapshot = builder.build_with_specs(&[spec]).await;

        assert_eq!(snapshot.version, REGISTRY_VERSION);
        let chain = &snapshot.chains[0];
        assert!(chain.network_health.rpc_connected);
        assert_eq!(chain.network_health.discovery_status.as_deref(), Some("ok"));
        assert_eq!(chain.pairs.len(), 1);
        assert_eq!(chain.pairs[0].token0_symbol, "mUSD");
        assert_eq!(chain.pairs[0].token1_symbol, "WETH");
        assert_eq!(chain.pairs[0].reserve0_decimal, "5");
        assert_eq!(chain.pairs[0].reserve1_decimal, "2");
        assert_eq!(chain.indexer.pair_addresses, vec![PAIR.to_string()]);

        // run again against the same server: identical output except timestamps
        let spec = hardhat_spec(&server.uri(), "TEST_DISCOVERY_RPC_URL_UNSET");
        let again = builder.build_with_specs(&[spec]).await;
        assert_eq!(
            serde_json::to_value(&snapshot.chains[0].pairs[0].reserve0_decimal).unwrap(),
            serde_json::to_value(&again.chains[0].pairs[0].reserve0_decimal).unwrap()
        );
        assert_eq!(again.chains[0].pairs.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_previous_when_rpc_missing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("chain-registry.generated.json");

        // seed a previous snapshot containing one pair
        let previous = RegistrySnapshot {
            version: REGISTRY_VERSION,
            generated_at: Some("2026-02-17T00:00:00+00:00".into()),
            source: None,
            chains: vec![ChainEntry {
                chain_key: "hardhat-local".into(),
                chain_id: 31337,
                pairs: vec![PairEntry {
                    pair_address: PAIR.into(),
                    token0_address: MUSD.into(),
                    token1_address: TOKEN_A.into(),
                    token0_symbol: "mUSD".into(),
                    token1_symbol: "WETH".into(),
                    reserve0_decimal: "5".into(),
                    reserve1_decimal: "2".into(),
                    ..PairEntry::default()
                }],
                ..ChainEntry::default()
            }],
        };
        std::fs::write(&out, serde_json::to_string_pretty(&previous).unwrap()).unwrap();

        let builder = RegistryBuilder::new(dir.path(), &out);
        let mut spec = hardhat_spec("", "TEST_FALLBACK_RPC_URL_UNSET");
        spec.default_rpc_url = String::new();
        let snapshot = builder.build_with_specs(&[spec]).await;

        let chain = &snapshot.chains[0];
        assert!(!chain.network_health.rpc_connected);
        let status = chain.network_health.discovery_status.clone().unwrap();
        assert!(status.starts_with("fallback-previous"), "{status}");
        assert_eq!(chain.pairs.len(), 1);
        assert_eq!(chain.pairs[0].pair_address, PAIR);
        assert_eq!(chain.network_health.fallback_pair_count, Some(1));
    }

    #[tokio::test]
    async fn test_write_is_atomic_and_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data").join("chain-registry.generated.json");
        let builder = RegistryBuilder::new(dir.path(), &out);

        let snapshot = RegistrySnapshot {
            version: REGISTRY_VERSION,
            generated_at: Some("2026-02-18T00:00:00+00:00".into()),
            source: Some("test".into()),
            chains: Vec::new(),
        };
        let written = builder.write(&snapshot).unwrap();
        let text = std::fs::read_to_string(&written).unwrap();
        assert!(text.ends_with('\n'));
        let reloaded: RegistrySnapshot = serde_json::from_str(&text).unwrap();
        assert_eq!(reloaded.version, REGISTRY_VERSION);
        assert!(!dir.path().join("data").join("chain-registry.generated.json.tmp").exists());
    }

    #[test]
    fn test_merge_pair_lists_secondary_wins() {
        let a = PairEntry {
            pair_address: PAIR.into(),
            token0_symbol: "old".into(),
            ..PairEntry::default()
        };
        let b = PairEntry {
            pair_address: PAIR.to_uppercase().replace("0X", "0x"),
            token0_symbol: "new".into(),
            ..PairEntry::default()
        };
        let merged = merge_pair_lists(&[a], &[b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].token0_symbol, "new");
    }

    #[test]
    fn test_trust_assumptions_shape() {
        let assumptions = trust_assumptions("hardhat-local", "2026-02-18T00:00:00+00:00");
        assert_eq!(assumptions.len(), 3);
        assert_eq!(assumptions[0]["endpoint"], "native-musd-policy");
        assert_eq!(assumptions[1]["asset_symbol"], "wBTC");
        assert_eq!(assumptions[2]["risk_level"], "high");
    }
}
