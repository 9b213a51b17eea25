//! Field-level validation of raw notes and derivation of the stable
//! transaction identifier.

use thiserror::Error;
use uuid::Uuid;

use tempo_runtime::decimal::parse_non_negative;
use tempo_runtime::proto::{DexTxRaw, DexTxValid, now_ts};
use tempo_runtime::types::NoteAction;

pub const VALIDATION_VERSION: &str = "v1";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("required field {0} is empty")]
    MissingField(&'static str),

    #[error("chain_id must be a positive integer, got {0}")]
    InvalidChainId(i64),

    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("field {field} is not a non-negative decimal: {value:?}")]
    InvalidDecimal { field: &'static str, value: String },
}

/// `tx_id` is a pure function of the note's logical identity, so retries of
/// the same `(chain_id, tx_hash, note_id)` always converge on one record.
pub fn derive_tx_id(chain_id: i64, tx_hash: &str, note_id: &str) -> String {
    let name = format!("{chain_id}:{tx_hash}:{note_id}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

fn require_non_empty(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(())
}

fn require_decimal(field: &'static str, value: &str) -> Result<(), ValidationError> {
    parse_non_negative(value)
        .map(|_| ())
        .ok_or_else(|| ValidationError::InvalidDecimal {
            field,
            value: value.to_string(),
        })
}

/// Validate a raw note and promote it. `min_out` is the only decimal field
/// where an empty string is coerced to `0`; everything else must parse.
/// A missing `occurred_at` defaults to now.
pub fn validate_note(raw: &DexTxRaw) -> Result<DexTxValid, ValidationError> {
    require_non_empty("note_id", &raw.note_id)?;
    require_non_empty("correlation_id", &raw.correlation_id)?;
    require_non_empty("tx_hash", &raw.tx_hash)?;
    require_non_empty("action", &raw.action)?;
    require_non_empty("user_address", &raw.user_address)?;
    require_non_empty("pool_address", &raw.pool_address)?;
    require_non_empty("token_in", &raw.token_in)?;
    require_non_empty("token_out", &raw.token_out)?;

    if raw.chain_id <= 0 {
        return Err(ValidationError::InvalidChainId(raw.chain_id));
    }
    if NoteAction::parse(&raw.action).is_none() {
        return Err(ValidationError::UnknownAction(raw.action.clone()));
    }

    require_decimal("amount_in", &raw.amount_in)?;
    require_decimal("amount_out", &raw.amount_out)?;
    require_decimal("fee_usd", &raw.fee_usd)?;
    require_decimal("gas_used", &raw.gas_used)?;
    require_decimal("gas_cost_usd", &raw.gas_cost_usd)?;
    require_decimal("protocol_revenue_usd", &raw.protocol_revenue_usd)?;

    let min_out = if raw.min_out.trim().is_empty() {
        "0".to_string()
    } else {
        require_decimal("min_out", &raw.min_out)?;
        raw.min_out.clone()
    };

    Ok(DexTxValid {
        note_id: raw.note_id.clone(),
        correlation_id: raw.correlation_id.clone(),
        chain_id: raw.chain_id,
        tx_hash: raw.tx_hash.clone(),
        action: raw.action.clone(),
        user_address: raw.user_address.clone(),
        pool_address: raw.pool_address.clone(),
        token_in: raw.token_in.clone(),
        token_out: raw.token_out.clone(),
        amount_in: raw.amount_in.clone(),
        amount_out: raw.amount_out.clone(),
        fee_usd: raw.fee_usd.clone(),
        gas_used: raw.gas_used.clone(),
        gas_cost_usd: raw.gas_cost_usd.clone(),
        protocol_revenue_usd: raw.protocol_revenue_usd.clone(),
        min_out,
        block_number: raw.block_number,
        occurred_at: raw.occurred_at.clone().or_else(|| Some(now_ts())),
        source: raw.source.clone(),
        tx_id: derive_tx_id(raw.chain_id, &raw.tx_hash, &raw.note_id),
        validation_version: VALIDATION_VERSION.to_string(),
    })
}
