//! `/pairs` assembly: registry-known pools merged with aggregated swap
//! activity from the transactional store, deduplicated per symbol pair with
//! the canonical pool preferred.

use serde::Serialize;
use std::collections::HashMap;

use crate::quote::CanonicalPoolAllowlist;
use crate::registry::{RegistrySnapshot, is_evm_address};
use crate::store::postgres::PairSwapStats;

#[derive(Debug, Clone, Copy)]
pub struct PairsQuery {
    pub chain_id: Option<i64>,
    pub limit: usize,
    pub dedupe_symbols: bool,
    pub include_external: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairRow {
    pub chain_id: i64,
    pub pool_address: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    pub reserve0: String,
    pub reserve1: String,
    pub swaps: i64,
    pub total_amount_in: String,
    pub total_amount_out: String,
    pub total_fee_usd: String,
    pub last_swap_at: Option<chrono::DateTime<chrono::Utc>>,
    pub canonical: bool,
    pub source: String,
}

/// Merge registry pairs with swap statistics and apply symbol-pair dedupe.
///
/// Preference order within a symbol group: allowlisted canonical pool, then
/// pools with real addresses, then registry-backed rows, then swap count.
/// With `include_external` the non-preferred rows are kept (flagged
/// non-canonical) instead of dropped; `dedupe_symbols=false` skips grouping
/// entirely.
pub fn merge_pairs(
    snapshot: &RegistrySnapshot,
    stats: &[PairSwapStats],
    allowlist: &CanonicalPoolAllowlist,
    query: PairsQuery,
) -> Vec<PairRow> {
    let mut rows: Vec<PairRow> = Vec::new();
    let mut by_pool: HashMap<(i64, String), usize> = HashMap::new();

    for chain in &snapshot.chains {
        if chain.chain_id <= 0 {
            continue;
        }
        if query.chain_id.is_some_and(|c| c != chain.chain_id) {
            continue;
        }
        for pair in &chain.pairs {
            let key = (chain.chain_id, pair.pair_address.trim().to_lowercase());
            by_pool.insert(key, rows.len());
            rows.push(PairRow {
                chain_id: chain.chain_id,
                pool_address: pair.pair_address.clone(),
                token0_symbol: pair.token0_symbol.clone(),
                token1_symbol: pair.token1_symbol.clone(),
                reserve0: pair.reserve0_decimal.clone(),
                reserve1: pair.reserve1_decimal.clone(),
                swaps: 0,
                total_amount_in: "0".into(),
                total_amount_out: "0".into(),
                total_fee_usd: "0".into(),
                last_swap_at: None,
                canonical: allowlist.contains(chain.chain_id, &pair.pair_address),
                source: "registry".into(),
            });
        }
    }

    for stat in stats {
        if query.chain_id.is_some_and(|c| c != stat.chain_id) {
            continue;
        }
        let key = (stat.chain_id, stat.pool_address.trim().to_lowercase());
        match by_pool.get(&key) {
            Some(index) => {
                let row = &mut rows[*index];
                row.swaps = stat.swaps;
                row.total_amount_in = stat.total_amount_in.clone();
                row.total_amount_out = stat.total_amount_out.clone();
                row.total_fee_usd = stat.total_fee_usd.clone();
                row.last_swap_at = Some(stat.last_swap_at);
                row.source = "registry+swaps".into();
            }
            None => {
                rows.push(PairRow {
                    chain_id: stat.chain_id,
                    pool_address: stat.pool_address.clone(),
                    token0_symbol: stat.token_in.clone(),
                    token1_symbol: stat.token_out.clone(),
                    reserve0: "0".into(),
                    reserve1: "0".into(),
                    swaps: stat.swaps,
                    total_amount_in: stat.total_amount_in.clone(),
                    total_amount_out: stat.total_amount_out.clone(),
                    total_fee_usd: stat.total_fee_usd.clone(),
                    last_swap_at: Some(stat.last_swap_at),
                    canonical: allowlist.contains(stat.chain_id, &stat.pool_address),
                    source: "swaps".into(),
                });
            }
        }
    }

    let mut rows = if query.dedupe_symbols {
        dedupe_by_symbols(rows, query.include_external)
    } else {
        rows
    };

    rows.sort_by(|a, b| {
        b.last_swap_at
            .cmp(&a.last_swap_at)
            .then_with(|| b.swaps.cmp(&a.swaps))
            .then_with(|| a.chain_id.cmp(&b.chain_id))
            .then_with(|| a.pool_address.cmp(&b.pool_address))
    });
    rows.truncate(query.limit);
    rows
}

fn preference_rank(row: &PairRow) -> (bool, bool, bool, i64) {
    (
        row.canonical,
        is_evm_address(&row.pool_address),
        row.source.starts_with("registry"),
        row.swaps,
    )
}

fn dedupe_by_symbols(rows: Vec<PairRow>, include_external: bool) -> Vec<PairRow> {
    let mut groups: HashMap<(i64, String, String), Vec<PairRow>> = HashMap::new();
    for row in rows {
        let mut symbols = [
            row.token0_symbol.to_uppercase(),
            row.token1_symbol.to_uppercase(),
        ];
        symbols.sort();
        groups
            .entry((row.chain_id, symbols[0].clone(), symbols[1].clone()))
            .or_default()
            .push(row);
    }

    let mut output = Vec::new();
    for (_, mut group) in groups {
        group.sort_by(|a, b| preference_rank(b).cmp(&preference_rank(a)));
        let mut iter = group.into_iter();
        if let Some(mut top) = iter.next() {
            top.canonical = true;
            output.push(top);
        }
        if include_external {
            output.extend(iter.map(|mut row| {
                row.canonical = false;
                row
            }));
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChainEntry, PairEntry};
    use chrono::Utc;

    fn snapshot_with_pairs() -> RegistrySnapshot {
        RegistrySnapshot {
            version: 3,
            generated_at: None,
            source: None,
            chains: vec![ChainEntry {
                chain_key: "hardhat-local".into(),
                chain_id: 31337,
                pairs: vec![
                    PairEntry {
                        pair_address: "0xaa00000000000000000000000000000000000001".into(),
                        token0_symbol: "mUSD".into(),
                        token1_symbol: "WETH".into(),
                        reserve0_decimal: "1000000".into(),
                        reserve1_decimal: "300".into(),
                        ..PairEntry::default()
                    },
                    PairEntry {
                        pair_address: "0xaa00000000000000000000000000000000000002".into(),
                        token0_symbol: "WETH".into(),
                        token1_symbol: "mUSD".into(),
                        reserve0_decimal: "1".into(),
                        reserve1_decimal: "3300".into(),
                        ..PairEntry::default()
                    },
                ],
                ..ChainEntry::default()
            }],
        }
    }

    fn stats_row(pool: &str, swaps: i64) -> PairSwapStats {
        PairSwapStats {
            chain_id: 31337,
            pool_address: pool.into(),
            token_in: "mUSD".into(),
            token_out: "WETH".into(),
            swaps,
            total_amount_in: "1000".into(),
            total_amount_out: "0.3".into(),
            total_fee_usd: "3".into(),
            last_swap_at: Utc::now(),
        }
    }

    #[test]
    fn test_merge_joins_stats_onto_registry_rows() {
        let query = PairsQuery {
            chain_id: None,
            limit: 100,
            dedupe_symbols: false,
            include_external: true,
        };
        let rows = merge_pairs(
            &snapshot_with_pairs(),
            &[stats_row("0xAA00000000000000000000000000000000000001", 7)],
            &CanonicalPoolAllowlist::default(),
            query,
        );
        assert_eq!(rows.len(), 2);
        let joined = rows.iter().find(|r| r.swaps == 7).unwrap();
        assert_eq!(joined.source, "registry+swaps");
        assert_eq!(joined.reserve0, "1000000");
    }

    #[test]
    fn test_dedupe_keeps_single_canonical_row() {
        let query = PairsQuery {
            chain_id: None,
            limit: 100,
            dedupe_symbols: true,
            include_external: false,
        };
        let rows = merge_pairs(
            &snapshot_with_pairs(),
            &[stats_row("0xaa00000000000000000000000000000000000002", 9)],
            &CanonicalPoolAllowlist::default(),
            query,
        );
        assert_eq!(rows.len(), 1);
        assert!(rows[0].canonical);
    }

    #[test]
    fn test_allowlist_steers_dedupe() {
        let query = PairsQuery {
            chain_id: None,
            limit: 100,
            dedupe_symbols: true,
            include_external: false,
        };
        let allowlist = CanonicalPoolAllowlist::from_csv(
            "31337:0xaa00000000000000000000000000000000000002",
        );
        let rows = merge_pairs(&snapshot_with_pairs(), &[], &allowlist, query);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pool_address, "0xaa00000000000000000000000000000000000002");
    }

    #[test]
    fn test_include_external_keeps_non_canonical_rows() {
        let query = PairsQuery {
            chain_id: None,
            limit: 100,
            dedupe_symbols: true,
            include_external: true,
        };
        let rows = merge_pairs(
            &snapshot_with_pairs(),
            &[],
            &CanonicalPoolAllowlist::default(),
            query,
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.iter().filter(|r| r.canonical).count(), 1);
    }

    #[test]
    fn test_standalone_swap_stats_become_rows() {
        let query = PairsQuery {
            chain_id: Some(31337),
            limit: 100,
            dedupe_symbols: false,
            include_external: true,
        };
        let rows = merge_pairs(
            &RegistrySnapshot::default(),
            &[stats_row("0xbb00000000000000000000000000000000000009", 3)],
            &CanonicalPoolAllowlist::default(),
            query,
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source, "swaps");
    }
}
