//! Binary runner for the note validator.

use tempo_runtime::settings::Settings;
use tempo_validator_lib::Validator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_log();
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env();
    let validator = Validator::new(settings)?;
    validator.run().await?;
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
