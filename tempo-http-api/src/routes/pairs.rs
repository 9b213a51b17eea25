use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{ApiState, bad_request, reject};
use tempo_runtime::pairs::{PairsQuery, merge_pairs};

#[derive(Deserialize)]
pub struct PairsParams {
    pub chain_id: Option<i64>,
    pub limit: Option<usize>,
    pub dedupe_symbols: Option<bool>,
    pub include_external: Option<bool>,
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/pairs", get(pairs))
}

async fn pairs(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<PairsParams>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = params.limit.unwrap_or(100);
    if !(1..=1000).contains(&limit) {
        return Err(bad_request("limit must be between 1 and 1000"));
    }

    let stats = state
        .pg
        .pair_swap_stats(params.chain_id)
        .await
        .map_err(reject)?;
    let snapshot = state.registry.snapshot();

    let rows = merge_pairs(
        &snapshot,
        &stats,
        state.quote.allowlist(),
        PairsQuery {
            chain_id: params.chain_id,
            limit,
            dedupe_symbols: params.dedupe_symbols.unwrap_or(true),
            include_external: params.include_external.unwrap_or(false),
        },
    );

    Ok(Json(json!({"rows": rows})))
}
