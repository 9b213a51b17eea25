//! Pipeline message schemas.
//!
//! The prost code in `dex_v1.rs` is pre-generated from
//! `packages/proto/*.proto` and checked in; runtime protoc compilation is
//! deliberately avoided. Regenerate with `prost-build` if the schemas change.

use chrono::{DateTime, TimeZone, Utc};
use prost_types::Timestamp;

mod dex_v1;

pub use dex_v1::{DexLedgerEntry, DexLedgerEntryBatch, DexTxRaw, DexTxValid};

/// Current wall clock as a protobuf timestamp.
pub fn now_ts() -> Timestamp {
    ts_from_datetime(Utc::now())
}

pub fn ts_from_datetime(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: dt.timestamp_subsec_nanos() as i32,
    }
}

/// Decode an optional proto timestamp, treating absent or out-of-range values
/// as `None` so callers can apply their own default.
pub fn ts_to_datetime(ts: Option<&Timestamp>) -> Option<DateTime<Utc>> {
    let ts = ts?;
    Utc.timestamp_opt(ts.seconds, ts.nanos.max(0) as u32).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn sample_raw() -> DexTxRaw {
        DexTxRaw {
            note_id: "11111111-2222-3333-4444-555555555555".into(),
            correlation_id: "66666666-7777-8888-9999-000000000000".into(),
            chain_id: 31337,
            tx_hash: "0xabc".into(),
            action: "SWAP".into(),
            user_address: "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".into(),
            pool_address: "0x1111111111111111111111111111111111111111".into(),
            token_in: "mUSD".into(),
            token_out: "WETH".into(),
            amount_in: "100.0".into(),
            amount_out: "0.03".into(),
            fee_usd: "0.30".into(),
            gas_used: "117104".into(),
            gas_cost_usd: "0.22".into(),
            protocol_revenue_usd: "0.12".into(),
            min_out: String::new(),
            block_number: 42,
            occurred_at: Some(now_ts()),
            source: "tempo-api-debug".into(),
        }
    }

    #[test]
    fn test_raw_note_encode_decode_round_trip() {
        let raw = sample_raw();
        let bytes = raw.encode_to_vec();
        let decoded = DexTxRaw::decode(bytes.as_slice()).unwrap();
        assert_eq!(raw, decoded);
    }

    #[test]
    fn test_timestamp_round_trip() {
        let dt = Utc.with_ymd_and_hms(2026, 2, 18, 12, 30, 0).unwrap();
        assert_eq!(ts_to_datetime(Some(&ts_from_datetime(dt))), Some(dt));
        assert_eq!(ts_to_datetime(None), None);
    }
}
