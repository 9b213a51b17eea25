use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::ApiState;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn root(State(state): State<Arc<ApiState>>) -> Json<Value> {
    Json(json!({"service": state.settings.app_name, "status": "ok"}))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Ready only when both stores answer a round-trip.
async fn ready(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if let Err(e) = state.pg.ping().await {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": format!("postgres not ready: {e}")})),
        ));
    }
    if let Err(e) = state.olap.ping().await {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"detail": format!("clickhouse not ready: {e}")})),
        ));
    }
    Ok(Json(json!({"status": "ready"})))
}
