//! Binary runner for the ledger writer. Postgres being unreachable at
//! startup is fatal: exit non-zero and let the supervisor restart us.

use tempo_ledger_writer_lib::LedgerWriter;
use tempo_runtime::settings::Settings;

#[tokio::main]
async fn main() {
    setup_log();
    let _ = dotenvy::dotenv();

    let settings = Settings::from_env();
    let writer = match LedgerWriter::connect(settings).await {
        Ok(writer) => writer,
        Err(err) => {
            tracing::error!(error = %err, "ledger writer startup failed");
            std::process::exit(1);
        }
    };

    if let Err(err) = writer.run().await {
        tracing::error!(error = %err, "ledger writer loop exited");
        std::process::exit(1);
    }
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
