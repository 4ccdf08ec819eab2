use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "fleet-controlplane", about = "Telemetry-agent fleet control plane")]
pub struct Cli {
    /// Directory for the embedded store and log files.
    #[arg(long, env = "FLEET_PATH", default_value = "./fleet-data")]
    pub path: PathBuf,

    /// Address the operator API and agent WebSocket endpoint bind to.
    #[arg(long, env = "FLEET_BIND", default_value = "0.0.0.0:8080")]
    pub bind: SocketAddr,

    /// PEM-encoded RSA private key used to sign bootstrap token JWS
    /// signatures. When absent, bootstrap runs in insecure/dev mode: any
    /// non-empty bearer is accepted.
    #[arg(long, env = "FLEET_SIGNING_KEY")]
    pub signing_key: Option<PathBuf>,

    #[arg(long, env = "FLEET_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// When set, logs are also written to a rolling file under `path/logs`.
    #[arg(long, env = "FLEET_LOG_TO_FILE")]
    pub log_to_file: bool,
}
