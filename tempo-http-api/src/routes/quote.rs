use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

use crate::{ApiState, bad_request, reject};
use tempo_runtime::compliance::enforce_optional_compliance;
use tempo_runtime::quote::QuoteRequest;

#[derive(Deserialize)]
pub struct QuoteQuery {
    pub chain_id: Option<i64>,
    pub token_in: Option<String>,
    pub token_out: Option<String>,
    pub amount_in: Option<String>,
    pub slippage_bps: Option<u32>,
    pub wallet_address: Option<String>,
    pub country_code: Option<String>,
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/quote", get(quote))
}

async fn quote(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let chain_id = match query.chain_id {
        Some(chain_id) if chain_id > 0 => chain_id,
        _ => return Err(bad_request("chain_id must be a positive integer")),
    };
    let token_in = query.token_in.unwrap_or_default();
    let token_out = query.token_out.unwrap_or_default();
    if token_in.trim().is_empty() || token_out.trim().is_empty() {
        return Err(bad_request("token_in and token_out are required"));
    }
    let amount_in = query
        .amount_in
        .as_deref()
        .and_then(|raw| Decimal::from_str(raw.trim()).ok())
        .ok_or_else(|| bad_request("amount_in must be a decimal number"))?;
    let slippage_bps = query.slippage_bps.unwrap_or(50);
    if !(1..=3000).contains(&slippage_bps) {
        return Err(bad_request("slippage_bps must be between 1 and 3000"));
    }

    enforce_optional_compliance(
        &state.settings,
        query.country_code.as_deref(),
        query.wallet_address.as_deref(),
    )
    .map_err(reject)?;

    let payload = state
        .quote
        .build_quote(&QuoteRequest {
            chain_id,
            token_in,
            token_out,
            amount_in,
            slippage_bps,
        })
        .map_err(reject)?;

    Ok(Json(serde_json::to_value(payload).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"detail": e.to_string()})),
        )
    })?))
}
