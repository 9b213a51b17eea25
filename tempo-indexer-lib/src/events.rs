//! On-chain event shapes watched by the indexer, and the pure decoding from
//! raw log entries into canonical event fields.

use alloy::primitives::U256;
use alloy::sol;
use alloy::sol_types::SolEvent;

use tempo_runtime::TempoError;
use tempo_runtime::decimal::scale_base_units;
use tempo_runtime::rpc::{LogEntry, abi};
use tempo_runtime::types::{NoteAction, STABLE_SYMBOL};

sol! {
    /// Harmony pair events (Uniswap-V2 shaped).
    event Swap(address indexed sender, uint256 amount0In, uint256 amount1In, uint256 amount0Out, uint256 amount1Out, address indexed to);
    event Mint(address indexed sender, uint256 amount0, uint256 amount1);
    event Burn(address indexed sender, uint256 amount0, uint256 amount1, address indexed to);

    /// Stabilizer mint/burn of mUSD against collateral.
    event NoteMinted(address indexed user, address indexed collateralToken, uint256 collateralAmount, uint256 musdAmount, uint256 feeAmount, address beneficiary);
    event NoteBurned(address indexed user, address indexed collateralToken, uint256 collateralAmount, uint256 musdAmount, uint256 feeAmount, address beneficiary);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Swap,
    Mint,
    Burn,
    NoteMinted,
    NoteBurned,
}

#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub decimals: u32,
}

#[derive(Debug, Clone)]
pub struct PairMeta {
    pub token0_address: String,
    pub token1_address: String,
    pub token0: TokenMeta,
    pub token1: TokenMeta,
}

/// The canonical fields extracted from one decoded log.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub action: NoteAction,
    pub user_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub amount_out: String,
}

/// Every topic0 the indexer subscribes to.
pub fn topic0_candidates() -> Vec<String> {
    [
        Swap::SIGNATURE_HASH,
        Mint::SIGNATURE_HASH,
        Burn::SIGNATURE_HASH,
        NoteMinted::SIGNATURE_HASH,
        NoteBurned::SIGNATURE_HASH,
    ]
    .iter()
    .map(|hash| hash.to_string())
    .collect()
}

pub fn classify(topic0: &str) -> Option<EventKind> {
    let topic = topic0.trim().to_lowercase();
    let matches = |hash: alloy::primitives::B256| topic == hash.to_string().to_lowercase();
    if matches(Swap::SIGNATURE_HASH) {
        Some(EventKind::Swap)
    } else if matches(Mint::SIGNATURE_HASH) {
        Some(EventKind::Mint)
    } else if matches(Burn::SIGNATURE_HASH) {
        Some(EventKind::Burn)
    } else if matches(NoteMinted::SIGNATURE_HASH) {
        Some(EventKind::NoteMinted)
    } else if matches(NoteBurned::SIGNATURE_HASH) {
        Some(EventKind::NoteBurned)
    } else {
        None
    }
}

fn data_word(data: &str, index: usize) -> Result<U256, TempoError> {
    let body = data.trim().trim_start_matches("0x");
    let start = index * 64;
    let end = start + 64;
    if body.len() < end {
        return Err(TempoError::Rpc(format!(
            "log data too short: wanted word {index}, have {} hex chars",
            body.len()
        )));
    }
    abi::decode_uint(&format!("0x{}", &body[start..end]))
}

fn topic_address(log: &LogEntry, index: usize) -> Result<String, TempoError> {
    let topic = log
        .topics
        .get(index)
        .ok_or_else(|| TempoError::Rpc(format!("log missing topic {index}")))?;
    abi::decode_address(topic)
}

fn scaled(amount: U256, decimals: u32) -> String {
    scale_base_units(&amount.to_string(), decimals)
}

/// Decode a pair log (`Swap`/`Mint`/`Burn`). Returns `None` for events that
/// carry no usable flow (e.g. a swap with all-zero amounts).
pub fn decode_pair_log(
    kind: EventKind,
    log: &LogEntry,
    meta: &PairMeta,
) -> Result<Option<DecodedEvent>, TempoError> {
    match kind {
        EventKind::Swap => {
            let amount0_in = data_word(&log.data, 0)?;
            let amount1_in = data_word(&log.data, 1)?;
            let amount0_out = data_word(&log.data, 2)?;
            let amount1_out = data_word(&log.data, 3)?;

            let (token_in, amount_in) = if amount0_in > U256::ZERO {
                (&meta.token0, scaled(amount0_in, meta.token0.decimals))
            } else if amount1_in > U256::ZERO {
                (&meta.token1, scaled(amount1_in, meta.token1.decimals))
            } else {
                return Ok(None);
            };
            let (token_out, amount_out) = if amount0_out > U256::ZERO {
                (&meta.token0, scaled(amount0_out, meta.token0.decimals))
            } else if amount1_out > U256::ZERO {
                (&meta.token1, scaled(amount1_out, meta.token1.decimals))
            } else {
                return Ok(None);
            };

            Ok(Some(DecodedEvent {
                action: NoteAction::Swap,
                user_address: topic_address(log, 2)?,
                token_in: token_in.symbol.clone(),
                token_out: token_out.symbol.clone(),
                amount_in,
                amount_out,
            }))
        }
        EventKind::Mint => {
            let amount0 = data_word(&log.data, 0)?;
            let amount1 = data_word(&log.data, 1)?;
            Ok(Some(DecodedEvent {
                action: NoteAction::LiquidityAdd,
                user_address: topic_address(log, 1)?,
                token_in: meta.token0.symbol.clone(),
                token_out: meta.token1.symbol.clone(),
                amount_in: scaled(amount0, meta.token0.decimals),
                amount_out: scaled(amount1, meta.token1.decimals),
            }))
        }
        EventKind::Burn => {
            let amount0 = data_word(&log.data, 0)?;
            let amount1 = data_word(&log.data, 1)?;
            Ok(Some(DecodedEvent {
                action: NoteAction::LiquidityRemove,
                user_address: topic_address(log, 2)?,
                token_in: meta.token0.symbol.clone(),
                token_out: meta.token1.symbol.clone(),
                amount_in: scaled(amount0, meta.token0.decimals),
                amount_out: scaled(amount1, meta.token1.decimals),
            }))
        }
        EventKind::NoteMinted | EventKind::NoteBurned => Err(TempoError::Rpc(
            "stabilizer log routed to pair decoder".into(),
        )),
    }
}

/// Decode a stabilizer log. The collateral token's metadata must already be
/// resolved; the mUSD side is always 18 decimals.
pub fn decode_stabilizer_log(
    kind: EventKind,
    log: &LogEntry,
    collateral: &TokenMeta,
) -> Result<Option<DecodedEvent>, TempoError> {
    let collateral_amount = data_word(&log.data, 0)?;
    let musd_amount = data_word(&log.data, 1)?;
    let user_address = topic_address(log, 1)?;

    match kind {
        EventKind::NoteMinted => Ok(Some(DecodedEvent {
            action: NoteAction::MusdMint,
            user_address,
            token_in: collateral.symbol.clone(),
            token_out: STABLE_SYMBOL.to_string(),
            amount_in: scaled(collateral_amount, collateral.decimals),
            amount_out: scaled(musd_amount, 18),
        })),
        EventKind::NoteBurned => Ok(Some(DecodedEvent {
            action: NoteAction::MusdBurn,
            user_address,
            token_in: STABLE_SYMBOL.to_string(),
            token_out: collateral.symbol.clone(),
            amount_in: scaled(musd_amount, 18),
            amount_out: scaled(collateral_amount, collateral.decimals),
        })),
        _ => Err(TempoError::Rpc("pair log routed to stabilizer decoder".into())),
    }
}
