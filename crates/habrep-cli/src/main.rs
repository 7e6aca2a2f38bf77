use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use habrep_report::{ReportGenerator, ServiceConfig};
use habrep_store::{PgReportStore, ReportStore};
use habrep_web::AppState;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "habrep")]
#[command(about = "User task/habit report service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP service.
    Serve,
    /// Ensure the report table exists, then exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ServiceConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let store = PgReportStore::connect(&config.database_url)
                .await
                .context("connecting report store")?;
            let generator =
                ReportGenerator::new(config.upstream()).context("building upstream client")?;
            let state = AppState::new(Arc::new(generator), Arc::new(store));
            info!(port = config.port, "starting habrep");
            habrep_web::serve(state, config.port).await?;
        }
        Commands::Migrate => {
            let store = PgReportStore::connect(&config.database_url)
                .await
                .context("connecting report store")?;
            store.close().await;
            println!("report table ready");
        }
    }

    Ok(())
}
