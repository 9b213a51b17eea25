//! Binary runner for the chain indexer.

use std::sync::Arc;

use tempo_indexer_lib::Indexer;
use tempo_indexer_lib::config::IndexerConfig;
use tempo_runtime::kafka;
use tempo_runtime::registry::RegistryCache;
use tempo_runtime::settings::Settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env();
    let config = IndexerConfig::from_env();

    let registry = Arc::new(RegistryCache::new(
        &settings.chain_registry_path,
        config.registry_refresh,
    ));
    let producer = kafka::producer(
        &settings.kafka_bootstrap_servers,
        &format!("tempo-indexer-{}", config.chain_key),
    )?;

    tracing::info!(
        chain_key = %config.chain_key,
        chain_id = config.chain_id,
        poll_interval = ?config.poll_interval,
        simulation = config.enable_simulation,
        "starting chain indexer"
    );

    let mut indexer = Indexer::new(settings, config, registry, producer);
    indexer.run().await;
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
