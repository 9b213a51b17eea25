use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{ApiState, bad_request, reject};

#[derive(Deserialize)]
pub struct LedgerQuery {
    pub limit: Option<i64>,
    pub chain_id: Option<i64>,
    pub entry_type: Option<String>,
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/ledger/recent", get(ledger_recent))
}

async fn ledger_recent(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LedgerQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let limit = query.limit.unwrap_or(100);
    if !(1..=2000).contains(&limit) {
        return Err(bad_request("limit must be between 1 and 2000"));
    }

    let rows = state
        .pg
        .recent_ledger_entries(limit, query.chain_id, query.entry_type.as_deref())
        .await
        .map_err(reject)?;

    Ok(Json(json!({"rows": rows})))
}
