mod api;
mod cli;
mod logging;
mod opamp;
mod repository;
mod server;
mod services;
mod state;

use clap::Parser;
use fleet_common::db::Database;
use tracing::info;

use crate::{cli::Cli, services::signing::SigningKey, state::GlobalState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_dir = cli.log_to_file.then(|| cli.path.join("logs"));
    logging::init(&cli.log_level, log_dir.as_deref())?;

    std::fs::create_dir_all(&cli.path)?;
    let db = Database::open(cli.path.join("store"))?;

    let signing_key = match &cli.signing_key {
        Some(path) => {
            let pem = std::fs::read(path)?;
            SigningKey::from_pem(&pem)?
        }
        None => {
            tracing::warn!("no signing key configured; bootstrap is running in insecure/dev mode");
            SigningKey::Insecure
        }
    };

    let state = GlobalState::load(db, signing_key);

    info!(bind = %cli.bind, "starting fleet control plane");
    let result = server::start(state.clone(), cli.bind).await;
    state.shutdown();
    result
}
