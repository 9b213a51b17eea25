//! Registry builder CLI: discover pairs over JSON-RPC and write the
//! versioned chain registry snapshot. Meant to run periodically (cron or a
//! deploy hook); a run with at least one usable chain always writes a file.

use tempo_runtime::registry::builder::RegistryBuilder;
use tempo_runtime::settings::env_str;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();
    let _ = dotenvy::dotenv();

    let deploy_dir = env_str("CHAIN_REGISTRY_DEPLOY_DIR", "packages/contracts/deploy");
    let out_path = env_str(
        "CHAIN_REGISTRY_PATH",
        "packages/sdk/data/chain-registry.generated.json",
    );

    let builder = RegistryBuilder::new(&deploy_dir, &out_path);
    let snapshot = builder.build().await;

    for chain in &snapshot.chains {
        tracing::info!(
            chain_key = %chain.chain_key,
            pairs = chain.pairs.len(),
            tokens = chain.tokens.len(),
            status = chain.network_health.discovery_status.as_deref().unwrap_or("unknown"),
            "chain assembled"
        );
    }

    let written = builder.write(&snapshot)?;
    println!("generated {}", written.display());
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
