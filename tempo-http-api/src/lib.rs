pub mod routes;

use axum::Json;
use axum::Router;
use axum::http::{HeaderValue, StatusCode};
use rdkafka::producer::FutureProducer;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

use tempo_runtime::TempoError;
use tempo_runtime::quote::QuoteEngine;
use tempo_runtime::registry::RegistryCache;
use tempo_runtime::settings::Settings;
use tempo_runtime::store::{OlapStore, PgStore};

/// Dependency-injected API state: every handler is a thin delegate over
/// these collaborators.
pub struct ApiState {
    pub settings: Settings,
    pub pg: PgStore,
    pub olap: OlapStore,
    pub producer: FutureProducer,
    pub registry: Arc<RegistryCache>,
    pub quote: QuoteEngine,
}

pub fn build_router(state: Arc<ApiState>) -> Router {
    let cors = cors_layer(&state.settings.cors_origins);
    Router::new()
        .merge(routes::health::router())
        .merge(routes::tokens::router())
        .merge(routes::risk::router())
        .merge(routes::quote::router())
        .merge(routes::pairs::router())
        .merge(routes::ledger::router())
        .merge(routes::analytics::router())
        .merge(routes::debug::router())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins_csv: &str) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins_csv
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| o.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Map a core error to its HTTP response; the body mirrors the
/// `{"detail": ...}` shape clients already parse.
pub(crate) fn reject(err: TempoError) -> (StatusCode, Json<Value>) {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"detail": err.detail()})))
}

pub(crate) fn bad_request(detail: &str) -> (StatusCode, Json<Value>) {
    reject(TempoError::rejection(422, detail))
}
