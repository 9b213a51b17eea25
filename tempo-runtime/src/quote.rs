//! Constant-product quote engine over a TTL-bounded snapshot of pair
//! liquidity.
//!
//! Routing tries the direct pool first and, when neither endpoint is the
//! stable asset, a two-hop route through mUSD, keeping whichever yields the
//! higher output. Canonical-pool selection collapses duplicate pools per
//! symbol pair before any routing happens.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::decimal::format_at_scale;
use crate::error::TempoError;
use crate::registry::{RegistryCache, RegistrySnapshot, is_evm_address};
use crate::types::STABLE_SYMBOL;

pub const QUOTE_ENGINE_TAG: &str = "harmony-engine-v2";

/// Hardhat local chain always allows the static rate fallback.
const LOCAL_CHAIN_ID: i64 = 31337;

#[derive(Debug, Clone)]
pub struct PairState {
    pub pair_address: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub reserve0: Decimal,
    pub reserve1: Decimal,
    pub checked_at: String,
}

#[derive(Debug, Clone)]
pub struct ChainLiquidityState {
    pub chain_id: i64,
    pub symbols: HashSet<String>,
    pub canonical_symbols: HashMap<String, String>,
    pub token_decimals: HashMap<String, u32>,
    pub pairs: Vec<PairState>,
    pub swap_fee_bps: u32,
    pub protocol_fee_bps: u32,
}

impl ChainLiquidityState {
    fn decimals_for(&self, symbol_upper: &str) -> u32 {
        self.token_decimals.get(symbol_upper).copied().unwrap_or(18)
    }
}

/// Parsed `CANONICAL_POOL_ALLOWLIST`: CSV of `0xADDR` (global) or
/// `CHAIN:0xADDR` (per-chain) entries, all lowercased.
#[derive(Debug, Clone, Default)]
pub struct CanonicalPoolAllowlist {
    global: HashSet<String>,
    per_chain: HashMap<i64, HashSet<String>>,
}

impl CanonicalPoolAllowlist {
    pub fn from_csv(raw: &str) -> Self {
        let mut allowlist = CanonicalPoolAllowlist::default();
        for item in raw.split(',') {
            let item = item.trim().to_lowercase();
            if item.is_empty() {
                continue;
            }
            match item.split_once(':') {
                Some((chain, address)) => {
                    if let Ok(chain_id) = chain.trim().parse::<i64>() {
                        allowlist
                            .per_chain
                            .entry(chain_id)
                            .or_default()
                            .insert(address.trim().to_string());
                    }
                }
                None => {
                    allowlist.global.insert(item);
                }
            }
        }
        allowlist
    }

    pub fn contains(&self, chain_id: i64, pool_address: &str) -> bool {
        let key = pool_address.trim().to_lowercase();
        self.global.contains(&key)
            || self
                .per_chain
                .get(&chain_id)
                .map(|set| set.contains(&key))
                .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct QuoteRequest {
    pub chain_id: i64,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: Decimal,
    pub slippage_bps: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotePayload {
    pub chain_id: i64,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub expected_out: String,
    pub min_out: String,
    pub slippage_bps: u32,
    pub route: Vec<String>,
    pub route_depth: String,
    pub liquidity_source: String,
    pub swap_fee_bps: u32,
    pub protocol_fee_bps: u32,
    pub lp_fee_bps: u32,
    pub protocol_fee_amount_in: String,
    pub engine: String,
}

struct QuoteSlot {
    expires_at: Option<Instant>,
    chains: HashMap<i64, Arc<ChainLiquidityState>>,
}

/// TTL-cached liquidity view plus quoting. On expiry the registry cache is
/// force-invalidated so a newer snapshot version is picked up immediately.
pub struct QuoteEngine {
    registry: Arc<RegistryCache>,
    ttl: Duration,
    allow_static_fallback: bool,
    allowlist: CanonicalPoolAllowlist,
    slot: RwLock<QuoteSlot>,
}

impl QuoteEngine {
    pub fn new(
        registry: Arc<RegistryCache>,
        ttl: Duration,
        allow_static_fallback: bool,
        allowlist: CanonicalPoolAllowlist,
    ) -> Self {
        QuoteEngine {
            registry,
            ttl,
            allow_static_fallback,
            allowlist,
            slot: RwLock::new(QuoteSlot {
                expires_at: None,
                chains: HashMap::new(),
            }),
        }
    }

    pub fn allowlist(&self) -> &CanonicalPoolAllowlist {
        &self.allowlist
    }

    pub fn get_chain(&self, chain_id: i64) -> Option<Arc<ChainLiquidityState>> {
        {
            let slot = self.slot.read().expect("quote cache poisoned");
            if slot.expires_at.map(|e| Instant::now() < e).unwrap_or(false) {
                return slot.chains.get(&chain_id).cloned();
            }
        }

        let mut slot = self.slot.write().expect("quote cache poisoned");
        if !slot.expires_at.map(|e| Instant::now() < e).unwrap_or(false) {
            self.registry.invalidate();
            let snapshot = self.registry.snapshot();
            slot.chains = build_liquidity_states(&snapshot, &self.allowlist);
            slot.expires_at = Some(Instant::now() + self.ttl);
        }
        slot.chains.get(&chain_id).cloned()
    }

    pub fn build_quote(&self, req: &QuoteRequest) -> Result<QuotePayload, TempoError> {
        let token_in = req.token_in.trim().to_string();
        let token_out = req.token_out.trim().to_string();

        if req.amount_in <= Decimal::ZERO {
            return Err(TempoError::rejection(422, "amount_in must be greater than zero"));
        }
        if token_in.to_uppercase() == token_out.to_uppercase() {
            return Err(TempoError::rejection(422, "token_in and token_out cannot be the same"));
        }

        let state = self.get_chain(req.chain_id).ok_or_else(|| {
            TempoError::rejection(404, format!("chain_id={} is not configured", req.chain_id))
        })?;

        let token_in_upper = token_in.to_uppercase();
        let token_out_upper = token_out.to_uppercase();

        if !state.symbols.contains(&token_in_upper) {
            return Err(TempoError::rejection(
                422,
                format!("token_in={token_in} is not registered for chain_id={}", req.chain_id),
            ));
        }
        if !state.symbols.contains(&token_out_upper) {
            return Err(TempoError::rejection(
                422,
                format!("token_out={token_out} is not registered for chain_id={}", req.chain_id),
            ));
        }

        let canonical_in = state
            .canonical_symbols
            .get(&token_in_upper)
            .cloned()
            .unwrap_or_else(|| token_in.clone());
        let canonical_out = state
            .canonical_symbols
            .get(&token_out_upper)
            .cloned()
            .unwrap_or_else(|| token_out.clone());
        let musd_symbol = state
            .canonical_symbols
            .get(&STABLE_SYMBOL.to_uppercase())
            .cloned()
            .unwrap_or_else(|| STABLE_SYMBOL.to_string());

        let direct = route_amount(&state, &canonical_in, &canonical_out, req.amount_in);

        let mut via_musd: Option<(Decimal, Decimal)> = None;
        if token_in_upper != STABLE_SYMBOL.to_uppercase()
            && token_out_upper != STABLE_SYMBOL.to_uppercase()
        {
            if let Some(first_leg) = route_amount(&state, &canonical_in, &musd_symbol, req.amount_in) {
                if let Some(second_leg) =
                    route_amount(&state, &musd_symbol, &canonical_out, first_leg.0)
                {
                    via_musd = Some((second_leg.0, first_leg.1.min(second_leg.1)));
                }
            }
        }

        let mut expected_out = Decimal::ZERO;
        let mut route: Vec<String> = Vec::new();
        let mut route_depth = Decimal::ZERO;
        let mut liquidity_source = "onchain-cache";

        if let Some((out, depth)) = direct {
            expected_out = out;
            route = vec![canonical_in.clone(), canonical_out.clone()];
            route_depth = depth;
        }
        if let Some((out, depth)) = via_musd {
            if out > expected_out {
                expected_out = out;
                route = vec![canonical_in.clone(), musd_symbol.clone(), canonical_out.clone()];
                route_depth = depth;
            }
        }

        if expected_out <= Decimal::ZERO {
            let allow_static = self.allow_static_fallback || req.chain_id == LOCAL_CHAIN_ID;
            if !allow_static {
                return Err(TempoError::rejection(
                    422,
                    format!(
                        "no on-chain liquidity route for {canonical_in}->{canonical_out} on chain_id={}; bootstrap pool liquidity before quoting",
                        req.chain_id
                    ),
                ));
            }
            liquidity_source = "static-fallback";
            expected_out = static_fallback_amount(&canonical_in, &canonical_out, req.amount_in);
            route = if token_in_upper == STABLE_SYMBOL.to_uppercase()
                || token_out_upper == STABLE_SYMBOL.to_uppercase()
            {
                vec![canonical_in.clone(), canonical_out.clone()]
            } else {
                vec![canonical_in.clone(), musd_symbol, canonical_out.clone()]
            };
            route_depth = Decimal::ZERO;
        }

        let slippage_mult =
            Decimal::from(10_000u32.saturating_sub(req.slippage_bps)) / Decimal::from(10_000u32);
        let min_out = expected_out * slippage_mult;
        let protocol_fee_amount_in =
            req.amount_in * Decimal::from(state.protocol_fee_bps) / Decimal::from(10_000u32);
        let lp_fee_bps = state.swap_fee_bps.saturating_sub(state.protocol_fee_bps);

        let in_decimals = state.decimals_for(&token_in_upper);
        let out_decimals = state.decimals_for(&token_out_upper);

        Ok(QuotePayload {
            chain_id: req.chain_id,
            token_in: canonical_in,
            token_out: canonical_out,
            amount_in: format_at_scale(req.amount_in, in_decimals),
            expected_out: format_at_scale(expected_out, out_decimals),
            min_out: format_at_scale(min_out, out_decimals),
            slippage_bps: req.slippage_bps,
            route,
            route_depth: format_at_scale(route_depth, 18),
            liquidity_source: liquidity_source.to_string(),
            swap_fee_bps: state.swap_fee_bps,
            protocol_fee_bps: state.protocol_fee_bps,
            lp_fee_bps,
            protocol_fee_amount_in: format_at_scale(protocol_fee_amount_in, in_decimals),
            engine: QUOTE_ENGINE_TAG.to_string(),
        })
    }
}

/// Uniswap-V2 output amount.
pub fn amount_out_constant_product(
    amount_in: Decimal,
    reserve_in: Decimal,
    reserve_out: Decimal,
    fee_bps: u32,
) -> Decimal {
    let fee_mult = Decimal::from(10_000u32.saturating_sub(fee_bps));
    let numerator = amount_in * fee_mult * reserve_out;
    let denominator = reserve_in * Decimal::from(10_000u32) + amount_in * fee_mult;
    if denominator <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    numerator / denominator
}

/// Best single-pool output for a symbol pair, with the route depth
/// (min reserve) of the winning pool.
fn route_amount(
    state: &ChainLiquidityState,
    token_in: &str,
    token_out: &str,
    amount_in: Decimal,
) -> Option<(Decimal, Decimal)> {
    let token_in_upper = token_in.to_uppercase();
    let token_out_upper = token_out.to_uppercase();
    let mut best_out = Decimal::ZERO;
    let mut best_depth = Decimal::ZERO;

    for pair in &state.pairs {
        let pair0 = pair.token0_symbol.to_uppercase();
        let pair1 = pair.token1_symbol.to_uppercase();

        let (reserve_in, reserve_out) = if pair0 == token_in_upper && pair1 == token_out_upper {
            (pair.reserve0, pair.reserve1)
        } else if pair1 == token_in_upper && pair0 == token_out_upper {
            (pair.reserve1, pair.reserve0)
        } else {
            continue;
        };

        let out = amount_out_constant_product(amount_in, reserve_in, reserve_out, state.swap_fee_bps);
        if out > best_out {
            best_out = out;
            best_depth = reserve_in.min(reserve_out);
        }
    }

    if best_out <= Decimal::ZERO {
        return None;
    }
    Some((best_out, best_depth))
}

/// Hardcoded mid-rates used when no on-chain liquidity is available and the
/// static fallback is allowed.
fn static_fallback_amount(token_in: &str, token_out: &str, amount_in: Decimal) -> Decimal {
    let token_in_upper = token_in.to_uppercase();
    let token_out_upper = token_out.to_uppercase();
    let mut rate = Decimal::ONE;
    if token_in_upper != token_out_upper {
        if token_in_upper == "MUSD" {
            rate = if token_out_upper == "WETH" || token_out_upper == "WSOL" {
                Decimal::new(3, 4) // 0.0003
            } else {
                Decimal::new(2, 5) // 0.00002
            };
        } else if token_out_upper == "MUSD" {
            rate = if token_in_upper == "WETH" || token_in_upper == "WSOL" {
                Decimal::from(3_300u32)
            } else {
                Decimal::from(52_000u32)
            };
        } else {
            rate = Decimal::new(6, 2); // 0.06
        }
    }
    amount_in * rate
}

/// Build the per-chain liquidity view from a registry snapshot, applying
/// canonical-pool selection per symbol pair.
pub fn build_liquidity_states(
    snapshot: &RegistrySnapshot,
    allowlist: &CanonicalPoolAllowlist,
) -> HashMap<i64, Arc<ChainLiquidityState>> {
    let mut chains = HashMap::new();

    for chain in &snapshot.chains {
        if chain.chain_id <= 0 {
            continue;
        }

        let mut symbols = HashSet::new();
        let mut canonical = HashMap::new();
        let mut token_decimals = HashMap::new();
        for token in &chain.tokens {
            let symbol = token.symbol.trim();
            if symbol.is_empty() {
                continue;
            }
            let upper = symbol.to_uppercase();
            symbols.insert(upper.clone());
            canonical.entry(upper.clone()).or_insert_with(|| symbol.to_string());
            token_decimals.insert(upper, token.decimals);
        }

        let swap_fee_bps = chain.amm.swap_fee_bps.min(10_000);
        let protocol_fee_bps = chain.amm.protocol_fee_bps.min(swap_fee_bps);

        let mut parsed_pairs = Vec::new();
        for pair in &chain.pairs {
            let token0 = pair.token0_symbol.trim();
            let token1 = pair.token1_symbol.trim();
            if token0.is_empty() || token1.is_empty() {
                continue;
            }
            let (Ok(reserve0), Ok(reserve1)) = (
                pair.reserve0_decimal.trim().parse::<Decimal>(),
                pair.reserve1_decimal.trim().parse::<Decimal>(),
            ) else {
                continue;
            };
            if reserve0 <= Decimal::ZERO || reserve1 <= Decimal::ZERO {
                continue;
            }
            parsed_pairs.push(PairState {
                pair_address: pair.pair_address.clone(),
                token0_symbol: token0.to_string(),
                token1_symbol: token1.to_string(),
                reserve0,
                reserve1,
                checked_at: pair.checked_at.clone().unwrap_or_default(),
            });
            for symbol in [token0, token1] {
                let upper = symbol.to_uppercase();
                symbols.insert(upper.clone());
                canonical.entry(upper).or_insert_with(|| symbol.to_string());
            }
        }

        let pairs = select_canonical_pairs(chain.chain_id, parsed_pairs, allowlist);

        chains.insert(
            chain.chain_id,
            Arc::new(ChainLiquidityState {
                chain_id: chain.chain_id,
                symbols,
                canonical_symbols: canonical,
                token_decimals,
                pairs,
                swap_fee_bps,
                protocol_fee_bps,
            }),
        );
    }

    chains
}

/// Keep only the preferred pool per `(chain, symbol pair)` group: allowlisted
/// pools first, then deepest by reserve product, then most recently checked,
/// then lowest address. Groups with no valid pool addresses keep every pool
/// (discovery-only fallback).
pub fn select_canonical_pairs(
    chain_id: i64,
    pairs: Vec<PairState>,
    allowlist: &CanonicalPoolAllowlist,
) -> Vec<PairState> {
    let mut groups: HashMap<(String, String), Vec<PairState>> = HashMap::new();
    for pair in pairs {
        let mut key = [
            pair.token0_symbol.to_uppercase(),
            pair.token1_symbol.to_uppercase(),
        ];
        key.sort();
        groups
            .entry((key[0].clone(), key[1].clone()))
            .or_default()
            .push(pair);
    }

    let mut keys: Vec<(String, String)> = groups.keys().cloned().collect();
    keys.sort();

    let mut selected = Vec::new();
    for key in keys {
        let mut group = groups.remove(&key).unwrap_or_default();
        if !group.iter().any(|p| is_evm_address(&p.pair_address)) {
            selected.append(&mut group);
            continue;
        }
        group.sort_by(|a, b| {
            let a_listed = allowlist.contains(chain_id, &a.pair_address);
            let b_listed = allowlist.contains(chain_id, &b.pair_address);
            b_listed
                .cmp(&a_listed)
                .then_with(|| (b.reserve0 * b.reserve1).cmp(&(a.reserve0 * a.reserve1)))
                .then_with(|| b.checked_at.cmp(&a.checked_at))
                .then_with(|| a.pair_address.to_lowercase().cmp(&b.pair_address.to_lowercase()))
        });
        if let Some(top) = group.into_iter().next() {
            selected.push(top);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AmmConfig, ChainEntry, PairEntry, TokenEntry};
    use std::str::FromStr;

    fn token(symbol: &str, decimals: u32) -> TokenEntry {
        TokenEntry {
            symbol: symbol.into(),
            name: symbol.into(),
            address: format!("0x{:0>40}", symbol.len()),
            decimals,
            source: "contracts.test".into(),
        }
    }

    fn pair(address: &str, s0: &str, s1: &str, r0: &str, r1: &str) -> PairEntry {
        PairEntry {
            pair_address: address.into(),
            token0_address: "0x1000000000000000000000000000000000000000".into(),
            token1_address: "0x2000000000000000000000000000000000000000".into(),
            token0_symbol: s0.into(),
            token1_symbol: s1.into(),
            reserve0_decimal: r0.into(),
            reserve1_decimal: r1.into(),
            checked_at: Some("2026-02-18T00:00:00+00:00".into()),
            ..PairEntry::default()
        }
    }

    fn fixture_snapshot() -> RegistrySnapshot {
        RegistrySnapshot {
            version: 3,
            generated_at: Some("2026-02-18T00:00:00+00:00".into()),
            source: None,
            chains: vec![
                ChainEntry {
                    chain_key: "hardhat-local".into(),
                    chain_id: 31337,
                    name: "Hardhat Local".into(),
                    amm: AmmConfig { swap_fee_bps: 30, protocol_fee_bps: 5 },
                    tokens: vec![
                        token("mUSD", 18),
                        token("WETH", 18),
                        token("WBTC", 8),
                        token("WSOL", 18),
                    ],
                    pairs: vec![
                        pair(
                            "0xaa00000000000000000000000000000000000001",
                            "mUSD",
                            "WETH",
                            "1000000",
                            "300",
                        ),
                        pair(
                            "0xaa00000000000000000000000000000000000002",
                            "WBTC",
                            "mUSD",
                            "10",
                            "650000",
                        ),
                    ],
                    ..ChainEntry::default()
                },
                ChainEntry {
                    chain_key: "ethereum-sepolia".into(),
                    chain_id: 11155111,
                    name: "Ethereum Sepolia".into(),
                    tokens: vec![token("mUSD", 18), token("WETH", 18)],
                    pairs: Vec::new(),
                    ..ChainEntry::default()
                },
            ],
        }
    }

    fn engine_with(snapshot: &RegistrySnapshot, allowlist: &str) -> (tempfile::TempDir, QuoteEngine) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain-registry.generated.json");
        std::fs::write(&path, serde_json::to_string(snapshot).unwrap()).unwrap();
        let registry = Arc::new(RegistryCache::new(&path, Duration::from_secs(3600)));
        let engine = QuoteEngine::new(
            registry,
            Duration::from_secs(20),
            false,
            CanonicalPoolAllowlist::from_csv(allowlist),
        );
        (dir, engine)
    }

    fn quote(engine: &QuoteEngine, chain_id: i64, token_in: &str, token_out: &str, amount: &str, slippage: u32) -> Result<QuotePayload, TempoError> {
        engine.build_quote(&QuoteRequest {
            chain_id,
            token_in: token_in.into(),
            token_out: token_out.into(),
            amount_in: Decimal::from_str(amount).unwrap(),
            slippage_bps: slippage,
        })
    }

    #[test]
    fn test_direct_musd_route() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        let payload = quote(&engine, 31337, "mUSD", "WETH", "1000", 50).unwrap();

        assert_eq!(payload.route, vec!["mUSD", "WETH"]);
        assert_eq!(payload.liquidity_source, "onchain-cache");
        let expected = Decimal::from_str(&payload.expected_out).unwrap();
        let min_out = Decimal::from_str(&payload.min_out).unwrap();
        assert!(expected > Decimal::ZERO);
        assert!(min_out < expected);

        // min_out is the floor of expected_raw * 9950/10000 at token precision
        let raw = amount_out_constant_product(
            Decimal::from(1000),
            Decimal::from(1_000_000),
            Decimal::from(300),
            30,
        );
        let expected_min = format_at_scale(raw * Decimal::from(9950u32) / Decimal::from(10_000u32), 18);
        assert_eq!(payload.min_out, expected_min);
    }

    #[test]
    fn test_two_hop_route_through_musd() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        let payload = quote(&engine, 31337, "WBTC", "WETH", "1", 100).unwrap();
        assert_eq!(payload.route, vec!["WBTC", "mUSD", "WETH"]);
        assert!(Decimal::from_str(&payload.expected_out).unwrap() > Decimal::ZERO);
    }

    #[test]
    fn test_unregistered_token_is_422() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        let err = quote(&engine, 31337, "INVALID", "WETH", "1", 50).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_unknown_chain_is_404() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        let err = quote(&engine, 999_999, "mUSD", "WETH", "1", 50).unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_no_liquidity_on_remote_chain_is_422_bootstrap() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        let err = quote(&engine, 11155111, "WETH", "mUSD", "1", 50).unwrap_err();
        assert_eq!(err.status_code(), 422);
        assert!(err.detail().contains("bootstrap pool liquidity"), "{}", err.detail());
    }

    #[test]
    fn test_static_fallback_on_local_chain() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        // WSOL is registered on 31337 but has no pool
        let payload = quote(&engine, 31337, "mUSD", "WSOL", "1000", 50).unwrap();
        assert_eq!(payload.liquidity_source, "static-fallback");
        assert_eq!(payload.expected_out, "0.3");
        assert_eq!(payload.route, vec!["mUSD", "WSOL"]);
    }

    #[test]
    fn test_same_token_and_zero_amount_rejected() {
        let (_dir, engine) = engine_with(&fixture_snapshot(), "");
        assert_eq!(quote(&engine, 31337, "mUSD", "musd", "1", 50).unwrap_err().status_code(), 422);
        assert_eq!(quote(&engine, 31337, "mUSD", "WETH", "0", 50).unwrap_err().status_code(), 422);
    }

    #[test]
    fn test_output_respects_fee_and_reserve_bounds() {
        let amount_in = Decimal::from(500);
        let reserve_in = Decimal::from(1_000_000);
        let reserve_out = Decimal::from(300);
        let out = amount_out_constant_product(amount_in, reserve_in, reserve_out, 30);
        let no_fee_bound = amount_in * reserve_out / (reserve_in + amount_in);
        assert!(out > Decimal::ZERO);
        assert!(out < no_fee_bound);
        assert!(out <= reserve_out);
    }

    #[test]
    fn test_canonical_dedupe_prefers_deeper_pool() {
        let mut snapshot = fixture_snapshot();
        snapshot.chains[0].pairs.push(pair(
            "0xaa00000000000000000000000000000000000003",
            "mUSD",
            "WETH",
            "10",
            "0.003",
        ));
        let states = build_liquidity_states(&snapshot, &CanonicalPoolAllowlist::default());
        let state = states.get(&31337).unwrap();
        let musd_weth: Vec<&PairState> = state
            .pairs
            .iter()
            .filter(|p| p.token0_symbol.to_uppercase() == "MUSD" && p.token1_symbol.to_uppercase() == "WETH")
            .collect();
        assert_eq!(musd_weth.len(), 1);
        assert_eq!(musd_weth[0].pair_address, "0xaa00000000000000000000000000000000000001");
    }

    #[test]
    fn test_canonical_dedupe_allowlist_wins_over_depth() {
        let mut snapshot = fixture_snapshot();
        snapshot.chains[0].pairs.push(pair(
            "0xaa00000000000000000000000000000000000003",
            "mUSD",
            "WETH",
            "10",
            "0.003",
        ));
        let allowlist =
            CanonicalPoolAllowlist::from_csv("31337:0xAA00000000000000000000000000000000000003");
        let states = build_liquidity_states(&snapshot, &allowlist);
        let state = states.get(&31337).unwrap();
        let musd_weth: Vec<&PairState> = state
            .pairs
            .iter()
            .filter(|p| p.token0_symbol.to_uppercase() == "MUSD")
            .filter(|p| p.token1_symbol.to_uppercase() == "WETH")
            .collect();
        assert_eq!(musd_weth.len(), 1);
        assert_eq!(musd_weth[0].pair_address, "0xaa00000000000000000000000000000000000003");
    }

    #[test]
    fn test_allowlist_parsing() {
        let allowlist = CanonicalPoolAllowlist::from_csv(
            "0xAA00000000000000000000000000000000000001, 97:0xBB00000000000000000000000000000000000002",
        );
        assert!(allowlist.contains(1, "0xaa00000000000000000000000000000000000001"));
        assert!(allowlist.contains(97, "0xbb00000000000000000000000000000000000002"));
        assert!(!allowlist.contains(1, "0xbb00000000000000000000000000000000000002"));
    }
}
