use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{ApiState, bad_request};

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub minutes: Option<u32>,
}

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/analytics", get(analytics))
}

/// Time-bucketed aggregates from the analytical store. An unreachable store
/// degrades to an empty payload with a warning instead of an error: the
/// dashboards polling this endpoint should keep rendering.
async fn analytics(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let minutes = query.minutes.unwrap_or(60);
    if !(1..=43_200).contains(&minutes) {
        return Err(bad_request("minutes must be between 1 and 43200"));
    }

    match state.olap.analytics(minutes).await {
        Ok(payload) => Ok(Json(serde_json::to_value(payload).unwrap_or_default())),
        Err(err) => {
            tracing::warn!(error = %err, "analytics store unavailable, serving degraded payload");
            Ok(Json(json!({
                "minutes": minutes,
                "volume_by_chain_token": [],
                "fee_revenue": [],
                "gas_cost_averages": [],
                "warning": "clickhouse_unavailable",
            })))
        }
    }
}
