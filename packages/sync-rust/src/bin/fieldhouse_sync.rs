//! Fieldhouse connection tool.
//!
//! Loads the stored connections and either lists them or tests them.
//! Credentials are read from `FIELDHOUSE_CONNECTIONS_<NAME>_API_KEY`
//! environment variables.
//!
//! Usage:
//!   fieldhouse-sync --connections connections.json list
//!   fieldhouse-sync check main

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fieldhouse_sync::{
    init_tracing, DataHub, EnvSecretStore, JsonFileConnectionStore, LogFormat, RestClientFactory,
    SyncConfig, TracingNotifier,
};

#[derive(Parser, Debug)]
#[command(name = "fieldhouse-sync")]
#[command(about = "Inspect and test Fieldhouse backend connections")]
struct Args {
    /// Engine configuration file (JSON)
    #[arg(long, env = "FIELDHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Connection store document
    #[arg(long, env = "FIELDHOUSE_CONNECTIONS", default_value = "connections.json")]
    connections: PathBuf,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List registered connections
    List,
    /// Test one connection, or every connection when NAME is omitted
    Check { name: Option<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.log_format)?;

    let config = match &args.config {
        Some(path) => SyncConfig::from_file(path).await?,
        None => SyncConfig::default(),
    };
    let hub = DataHub::new(
        config,
        Arc::new(RestClientFactory::new()),
        Arc::new(EnvSecretStore::new()),
    );
    let admin = hub.admin(
        Arc::new(JsonFileConnectionStore::new(&args.connections)),
        Arc::new(TracingNotifier),
    );
    let loaded = admin
        .load()
        .await
        .with_context(|| format!("loading connections from {}", args.connections.display()))?;
    tracing::debug!(loaded, "connections loaded");

    match args.command {
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&hub.list_connections())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { name } => {
            let names = match name {
                Some(name) => vec![name],
                None => hub.list_connections().into_iter().map(|c| c.name).collect(),
            };
            let mut results = Vec::with_capacity(names.len());
            for name in &names {
                results.push(hub.test_connection(name.as_str()).await);
            }
            println!("{}", serde_json::to_string_pretty(&results)?);
            if results.iter().all(|r| r.success) {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
