//! Double-entry derivation: one valid note becomes zero or more balanced
//! debit/credit row pairs.
//!
//! Every produced `(tx_id, entry_type, asset)` pair has exactly one debit and
//! one credit row with equal, strictly positive amounts. Tuples whose amount
//! is zero or negative are dropped before any row is emitted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::decimal::dec_or_zero;
use crate::proto::DexTxValid;
use crate::types::{NoteAction, STABLE_SYMBOL};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySide::Debit => "debit",
            EntrySide::Credit => "credit",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerRow {
    pub tx_id: String,
    pub note_id: String,
    pub chain_id: i64,
    pub tx_hash: String,
    pub account_id: String,
    pub side: EntrySide,
    pub asset: String,
    pub amount: Decimal,
    pub entry_type: String,
    pub fee_usd: Decimal,
    pub gas_cost_usd: Decimal,
    pub protocol_revenue_usd: Decimal,
    pub pool_address: String,
    pub occurred_at: DateTime<Utc>,
}

pub fn user_account(user_address: &str) -> String {
    format!("user:{}", user_address.to_lowercase())
}

pub fn pool_account(pool_address: &str) -> String {
    format!("pool:{}", pool_address.to_lowercase())
}

pub fn network_account(chain_id: i64) -> String {
    format!("network:{chain_id}")
}

pub const TREASURY_ACCOUNT: &str = "protocol:treasury";
pub const CONVERSION_ACCOUNT: &str = "protocol:conversion";

/// Derive the balanced ledger rows for one valid note.
///
/// Actions with no modeled flows (currently `PROTOCOL_FEE_ACCRUED`) yield an
/// empty batch; the transaction record itself is still persisted upstream.
pub fn build_ledger_rows(valid: &DexTxValid, occurred_at: DateTime<Utc>) -> Vec<LedgerRow> {
    let amount_in = dec_or_zero(&valid.amount_in);
    let amount_out = dec_or_zero(&valid.amount_out);
    let fee_usd = dec_or_zero(&valid.fee_usd);
    let gas_cost_usd = dec_or_zero(&valid.gas_cost_usd);
    let protocol_revenue_usd = dec_or_zero(&valid.protocol_revenue_usd);

    let mut rows: Vec<LedgerRow> = Vec::new();

    let user = user_account(&valid.user_address);
    let pool = pool_account(&valid.pool_address);
    let network = network_account(valid.chain_id);

    let mut add_pair = |entry_type: &str, debit_account: &str, credit_account: &str, asset: &str, amount: Decimal| {
        if amount <= Decimal::ZERO {
            return;
        }
        for (account_id, side) in [(debit_account, EntrySide::Debit), (credit_account, EntrySide::Credit)] {
            rows.push(LedgerRow {
                tx_id: valid.tx_id.clone(),
                note_id: valid.note_id.clone(),
                chain_id: valid.chain_id,
                tx_hash: valid.tx_hash.clone(),
                account_id: account_id.to_string(),
                side,
                asset: asset.to_string(),
                amount,
                entry_type: entry_type.to_string(),
                fee_usd,
                gas_cost_usd,
                protocol_revenue_usd,
                pool_address: valid.pool_address.clone(),
                occurred_at,
            });
        }
    };

    match NoteAction::parse(&valid.action) {
        Some(NoteAction::Swap) => {
            add_pair("swap_notional_in", &user, &pool, &valid.token_in, amount_in);
            add_pair("swap_notional_out", &pool, &user, &valid.token_out, amount_out);
            add_pair("trade_fee_usd", &user, TREASURY_ACCOUNT, "USD", fee_usd);
            add_pair("protocol_revenue_usd", &pool, TREASURY_ACCOUNT, "USD", protocol_revenue_usd);
            add_pair("gas_cost_usd", &user, &network, "USD", gas_cost_usd);
        }
        Some(NoteAction::LiquidityAdd) => {
            add_pair("liquidity_add_in_a", &user, &pool, &valid.token_in, amount_in);
            add_pair("liquidity_add_in_b", &user, &pool, &valid.token_out, amount_out);
            add_pair("gas_cost_usd", &user, &network, "USD", gas_cost_usd);
        }
        Some(NoteAction::LiquidityRemove) => {
            add_pair("liquidity_remove_out_a", &pool, &user, &valid.token_in, amount_in);
            add_pair("liquidity_remove_out_b", &pool, &user, &valid.token_out, amount_out);
            add_pair("gas_cost_usd", &user, &network, "USD", gas_cost_usd);
        }
        Some(NoteAction::MusdMint) => {
            add_pair("musd_mint_collateral", &user, &pool, &valid.token_in, amount_in);
            add_pair("musd_mint_issue", &pool, &user, &valid.token_out, amount_out);
            add_pair("gas_cost_usd", &user, &network, "USD", gas_cost_usd);
        }
        Some(NoteAction::MusdBurn) => {
            add_pair("musd_burn_in", &user, &pool, &valid.token_in, amount_in);
            add_pair("musd_burn_redeem", &pool, &user, &valid.token_out, amount_out);
            add_pair("gas_cost_usd", &user, &network, "USD", gas_cost_usd);
        }
        Some(NoteAction::FeeTransferredToTreasury) => {
            add_pair("fee_transfer_to_treasury", &pool, TREASURY_ACCOUNT, &valid.token_in, amount_in);
        }
        Some(NoteAction::TreasuryConvertedToMusd) => {
            add_pair("treasury_convert_spend", CONVERSION_ACCOUNT, TREASURY_ACCOUNT, &valid.token_in, amount_in);
            add_pair("treasury_convert_receive", TREASURY_ACCOUNT, CONVERSION_ACCOUNT, &valid.token_out, amount_out);
        }
        Some(NoteAction::DistributionExecuted) => {
            add_pair("treasury_distribution", &user, TREASURY_ACCOUNT, STABLE_SYMBOL, amount_in);
        }
        Some(NoteAction::ProtocolFeeAccrued) | None => {}
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn valid_note(action: &str) -> DexTxValid {
        DexTxValid {
            note_id: "note-1".into(),
            correlation_id: "corr-1".into(),
            chain_id: 31337,
            tx_hash: "0xhash".into(),
            action: action.into(),
            user_address: "0xF39Fd6e51aad88F6F4ce6aB8827279cffFb92266".into(),
            pool_address: "0x1111111111111111111111111111111111111111".into(),
            token_in: "mUSD".into(),
            token_out: "WETH".into(),
            amount_in: "100".into(),
            amount_out: "0.03".into(),
            fee_usd: "0.30".into(),
            gas_used: "117104".into(),
            gas_cost_usd: "0.22".into(),
            protocol_revenue_usd: "0.12".into(),
            min_out: "0".into(),
            block_number: 1,
            occurred_at: None,
            source: "chain-indexer".into(),
            tx_id: "9a1cf6b0-0000-5000-8000-000000000000".into(),
            validation_version: "v1".into(),
        }
    }

    /// Every (entry_type, asset) group must contain exactly one debit and one
    /// credit of equal amount.
    fn assert_balanced(rows: &[LedgerRow]) {
        let mut groups: HashMap<(String, String), Vec<&LedgerRow>> = HashMap::new();
        for row in rows {
            assert!(row.amount > Decimal::ZERO);
            groups
                .entry((row.entry_type.clone(), row.asset.clone()))
                .or_default()
                .push(row);
        }
        for (key, group) in groups {
            assert_eq!(group.len(), 2, "group {key:?}");
            let debit = group.iter().find(|r| r.side == EntrySide::Debit).expect("debit row");
            let credit = group.iter().find(|r| r.side == EntrySide::Credit).expect("credit row");
            assert_eq!(debit.amount, credit.amount, "group {key:?}");
        }
    }

    #[test]
    fn test_swap_produces_five_balanced_pairs() {
        let rows = build_ledger_rows(&valid_note("SWAP"), Utc::now());
        assert_eq!(rows.len(), 10);
        assert_balanced(&rows);

        let entry_types: Vec<&str> = rows.iter().map(|r| r.entry_type.as_str()).collect();
        for expected in [
            "swap_notional_in",
            "swap_notional_out",
            "trade_fee_usd",
            "protocol_revenue_usd",
            "gas_cost_usd",
        ] {
            assert_eq!(entry_types.iter().filter(|t| **t == expected).count(), 2);
        }
    }

    #[test]
    fn test_swap_accounts_and_directions() {
        let rows = build_ledger_rows(&valid_note("SWAP"), Utc::now());
        let notional_in_debit = rows
            .iter()
            .find(|r| r.entry_type == "swap_notional_in" && r.side == EntrySide::Debit)
            .unwrap();
        assert_eq!(
            notional_in_debit.account_id,
            "user:0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        let gas_credit = rows
            .iter()
            .find(|r| r.entry_type == "gas_cost_usd" && r.side == EntrySide::Credit)
            .unwrap();
        assert_eq!(gas_credit.account_id, "network:31337");
    }

    #[test]
    fn test_zero_amounts_are_skipped() {
        let mut note = valid_note("SWAP");
        note.fee_usd = "0".into();
        note.protocol_revenue_usd = "".into();
        let rows = build_ledger_rows(&note, Utc::now());
        assert_eq!(rows.len(), 6);
        assert_balanced(&rows);
        assert!(!rows.iter().any(|r| r.entry_type == "trade_fee_usd"));
        assert!(!rows.iter().any(|r| r.entry_type == "protocol_revenue_usd"));
    }

    #[test]
    fn test_liquidity_add_and_remove_directions() {
        let add = build_ledger_rows(&valid_note("LIQUIDITY_ADD"), Utc::now());
        assert_balanced(&add);
        let add_debit = add
            .iter()
            .find(|r| r.entry_type == "liquidity_add_in_a" && r.side == EntrySide::Debit)
            .unwrap();
        assert!(add_debit.account_id.starts_with("user:"));

        let remove = build_ledger_rows(&valid_note("LIQUIDITY_REMOVE"), Utc::now());
        assert_balanced(&remove);
        let remove_debit = remove
            .iter()
            .find(|r| r.entry_type == "liquidity_remove_out_a" && r.side == EntrySide::Debit)
            .unwrap();
        assert!(remove_debit.account_id.starts_with("pool:"));
    }

    #[test]
    fn test_mint_burn_treasury_and_distribution() {
        for action in ["MUSD_MINT", "MUSD_BURN", "FEE_TRANSFERRED_TO_TREASURY", "TREASURY_CONVERTED_TO_MUSD"] {
            let rows = build_ledger_rows(&valid_note(action), Utc::now());
            assert!(!rows.is_empty(), "{action}");
            assert_balanced(&rows);
        }

        let distribution = build_ledger_rows(&valid_note("DISTRIBUTION_EXECUTED"), Utc::now());
        assert_balanced(&distribution);
        assert_eq!(distribution.len(), 2);
        assert_eq!(distribution[0].asset, "mUSD");
        assert_eq!(distribution[0].entry_type, "treasury_distribution");
    }

    #[test]
    fn test_protocol_fee_accrued_produces_no_rows() {
        let rows = build_ledger_rows(&valid_note("PROTOCOL_FEE_ACCRUED"), Utc::now());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let at = Utc::now();
        let a = build_ledger_rows(&valid_note("SWAP"), at);
        let b = build_ledger_rows(&valid_note("SWAP"), at);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.entry_type, y.entry_type);
            assert_eq!(x.account_id, y.account_id);
            assert_eq!(x.amount, y.amount);
        }
    }
}
