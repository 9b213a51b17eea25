//! Binary runner for the Tempo HTTP API.
//!
//! Wires the dependency-injected state (Postgres pool, analytical store,
//! Kafka producer, registry cache, quote engine) and serves the axum router.
//! An unreachable ClickHouse must not block startup; analytics serves a
//! degraded payload until it recovers.

use rdkafka::producer::Producer;
use std::sync::Arc;
use std::time::Duration;

use tempo_http_api::{ApiState, build_router};
use tempo_runtime::kafka;
use tempo_runtime::quote::{CanonicalPoolAllowlist, QuoteEngine};
use tempo_runtime::registry::RegistryCache;
use tempo_runtime::settings::{Settings, env_parse};
use tempo_runtime::store::{OlapStore, PgStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env();
    let port: u16 = env_parse("API_PORT", 8500);

    // ── 1. Stores ────────────────────────────────────────────────────────────
    let pg = PgStore::connect_lazy(&settings.postgres_dsn)?;
    if let Err(e) = pg.ping().await {
        tracing::warn!(error = %e, "postgres not reachable yet, readiness will report it");
    }

    let olap = OlapStore::new(&settings);
    if let Err(e) = olap.ping().await {
        tracing::warn!(error = %e, "clickhouse not reachable yet, analytics degraded");
    }

    // ── 2. Producer + registry + quote engine ────────────────────────────────
    let producer = kafka::producer(&settings.kafka_bootstrap_servers, &settings.app_name)?;

    let registry = Arc::new(RegistryCache::new(
        &settings.chain_registry_path,
        Duration::from_secs(settings.quote_cache_ttl_seconds),
    ));
    let quote = QuoteEngine::new(
        Arc::clone(&registry),
        Duration::from_secs(settings.quote_cache_ttl_seconds),
        settings.quote_allow_static_fallback,
        CanonicalPoolAllowlist::from_csv(&settings.canonical_pool_allowlist),
    );

    let state = Arc::new(ApiState {
        settings,
        pg,
        olap,
        producer,
        registry,
        quote,
    });

    // ── 3. Serve ─────────────────────────────────────────────────────────────
    let router = build_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(app = %state.settings.app_name, port, "tempo api listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    // ── 4. Drain in order: producer flush, then pool ─────────────────────────
    if let Err(e) = state.producer.flush(Duration::from_secs(5)) {
        tracing::warn!(error = %e, "producer flush on shutdown failed");
    }
    state.pg.close().await;

    Ok(())
}

fn setup_log() {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};
    if tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .is_err()
    {}
}
