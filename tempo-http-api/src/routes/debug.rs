use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use prost::Message;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiState, reject};
use tempo_runtime::compliance::enforce_optional_compliance;
use tempo_runtime::kafka;
use tempo_runtime::proto::{DexTxRaw, now_ts};

/// Synthetic swap note published straight onto the raw topic; every field
/// has a sensible local-chain default so `POST {}` exercises the pipeline.
#[derive(Deserialize)]
#[serde(default)]
pub struct EmitSwapRequest {
    pub chain_id: i64,
    pub tx_hash: String,
    pub user_address: String,
    pub pool_address: String,
    pub token_in: String,
    pub token_out: String,
    pub amount_in: String,
    pub amount_out: String,
    pub fee_usd: String,
    pub gas_used: String,
    pub gas_cost_usd: String,
    pub protocol_revenue_usd: String,
    pub block_number: i64,
    pub action: String,
    pub country_code: Option<String>,
}

impl Default for EmitSwapRequest {
    fn default() -> Self {
        EmitSwapRequest {
            chain_id: 31337,
            tx_hash: format!(
                "0x{}{}",
                Uuid::new_v4().simple(),
                &Uuid::new_v4().simple().to_string()[..32]
            ),
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
            block_number: 1,
            action: "SWAP".into(),
            country_code: None,
        }
    }
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/debug/emit-swap-note", post(emit_swap_note))
}

async fn emit_swap_note(
    State(state): State<Arc<ApiState>>,
    Json(req): Json<EmitSwapRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    enforce_optional_compliance(
        &state.settings,
        req.country_code.as_deref(),
        Some(&req.user_address),
    )
    .map_err(reject)?;

    let note_id = Uuid::new_v4().to_string();
    let correlation_id = Uuid::new_v4().to_string();

    let note = DexTxRaw {
        note_id: note_id.clone(),
        correlation_id: correlation_id.clone(),
        chain_id: req.chain_id,
        tx_hash: req.tx_hash,
        action: req.action.clone(),
        user_address: req.user_address,
        pool_address: req.pool_address,
        token_in: req.token_in,
        token_out: req.token_out,
        amount_in: req.amount_in,
        amount_out: req.amount_out,
        fee_usd: req.fee_usd,
        gas_used: req.gas_used,
        gas_cost_usd: req.gas_cost_usd,
        protocol_revenue_usd: req.protocol_revenue_usd,
        min_out: String::new(),
        block_number: req.block_number,
        occurred_at: Some(now_ts()),
        source: "tempo-api-debug".into(),
    };

    kafka::publish(
        &state.producer,
        &state.settings.dex_tx_raw_topic,
        &note_id,
        &note.encode_to_vec(),
        Some(&correlation_id),
    )
    .await
    .map_err(reject)?;

    tracing::info!(
        note_id = %note_id,
        action = %req.action,
        chain_id = req.chain_id,
        "published debug swap note"
    );

    Ok(Json(json!({
        "status": "accepted",
        "note_id": note_id,
        "correlation_id": correlation_id,
        "topic": state.settings.dex_tx_raw_topic,
        "published_at": Utc::now().to_rfc3339(),
    })))
}
