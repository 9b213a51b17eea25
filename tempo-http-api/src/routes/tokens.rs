use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::sync::Arc;

use crate::ApiState;
use tempo_runtime::registry::tokens_payload;

pub fn router() -> Router<Arc<ApiState>> {
    Router::new().route("/tokens", get(tokens))
}

async fn tokens(State(state): State<Arc<ApiState>>) -> Json<Value> {
    let snapshot = state.registry.snapshot();
    Json(tokens_payload(&snapshot))
}
