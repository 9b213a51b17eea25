use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{ApiState, bad_request};
use tempo_runtime::registry::risk_assumptions_payload;

#[derive(Deserialize)]
pub struct RiskQuery {
    pub chain_id: Option<i64>,
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/risk/assumptions", get(risk_assumptions))
}

async fn risk_assumptions(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<RiskQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let chain_id = match query.chain_id {
        Some(chain_id) if chain_id > 0 => chain_id,
        _ => return Err(bad_request("chain_id must be a positive integer")),
    };

    let snapshot = state.registry.snapshot();
    match risk_assumptions_payload(&snapshot, chain_id) {
        Some(payload) => Ok(Json(payload)),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("chain_id={chain_id} not found")})),
        )),
    }
}
