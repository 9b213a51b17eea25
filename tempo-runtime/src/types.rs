use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display symbol of the protocol's stable asset.
pub const STABLE_SYMBOL: &str = "mUSD";

/// Event type stamped on every outbox row produced by the ledger writer.
pub const OUTBOX_EVENT_NOTE_INGESTED: &str = "dex.note.ingested";

/// Canonical action carried on a note. Wire representation is the
/// SCREAMING_SNAKE name used by the contracts and the analytics views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteAction {
    Swap,
    LiquidityAdd,
    LiquidityRemove,
    MusdMint,
    MusdBurn,
    ProtocolFeeAccrued,
    FeeTransferredToTreasury,
    TreasuryConvertedToMusd,
    DistributionExecuted,
}

impl NoteAction {
    pub const ALL: [NoteAction; 9] = [
        NoteAction::Swap,
        NoteAction::LiquidityAdd,
        NoteAction::LiquidityRemove,
        NoteAction::MusdMint,
        NoteAction::MusdBurn,
        NoteAction::ProtocolFeeAccrued,
        NoteAction::FeeTransferredToTreasury,
        NoteAction::TreasuryConvertedToMusd,
        NoteAction::DistributionExecuted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteAction::Swap => "SWAP",
            NoteAction::LiquidityAdd => "LIQUIDITY_ADD",
            NoteAction::LiquidityRemove => "LIQUIDITY_REMOVE",
            NoteAction::MusdMint => "MUSD_MINT",
            NoteAction::MusdBurn => "MUSD_BURN",
            NoteAction::ProtocolFeeAccrued => "PROTOCOL_FEE_ACCRUED",
            NoteAction::FeeTransferredToTreasury => "FEE_TRANSFERRED_TO_TREASURY",
            NoteAction::TreasuryConvertedToMusd => "TREASURY_CONVERTED_TO_MUSD",
            NoteAction::DistributionExecuted => "DISTRIBUTION_EXECUTED",
        }
    }

    pub fn parse(raw: &str) -> Option<NoteAction> {
        NoteAction::ALL.into_iter().find(|a| a.as_str() == raw)
    }
}

impl std::fmt::Display for NoteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outbox payload written alongside the transaction record and forwarded to
/// the outbox topic after commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_type: String,
    pub tx_id: String,
    pub note_id: String,
    pub chain_id: i64,
    pub tx_hash: String,
    pub action: String,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trips_wire_names() {
        for action in NoteAction::ALL {
            assert_eq!(NoteAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(NoteAction::parse("TRANSFER"), None);
    }
}
