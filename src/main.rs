use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use vigia::alerts::{AlertDispatcher, ConsoleChannel, EmailChannel, NotificationChannel};
use vigia::config::{AppConfig, Products};
use vigia::extractor::Extractor;
use vigia::fetcher::Fetcher;
use vigia::monitor::Monitor;
use vigia::store::PriceStore;

#[derive(Parser)]
#[command(name = "vigia", version, about = "E-commerce price monitoring with threshold alerts")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one monitoring pass over the product list
    Run {
        /// Path to the product list (TOML)
        #[arg(short, long, default_value = "products.toml")]
        products: PathBuf,
    },
    /// Delete observations older than the configured retention window
    Prune,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigia=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("failed to load configuration")?;
    let store = PriceStore::connect(&config.database.url, config.database.max_connections)
        .await
        .context("failed to open price database")?;

    match cli.command {
        Command::Run { products } => {
            let products = Products::from_path(&products)?;
            let monitor = Monitor::new(
                Fetcher::new(config.fetcher.clone()).context("failed to build HTTP client")?,
                Extractor::new(),
                store,
                AlertDispatcher::new(build_channels(&config)?),
                config.monitor.clone(),
            );

            let deadline = config
                .monitor
                .run_deadline_secs
                .map(std::time::Duration::from_secs);
            let result = monitor.run_once(&products, deadline).await?;
            println!(
                "{} produtos verificados: {} ok, {} com falha, {} alertas ({} ms)",
                result.total_products,
                result.successful,
                result.failed,
                result.alerts_sent,
                result.elapsed_ms,
            );
            for error in &result.errors {
                eprintln!("  {error}");
            }
        }
        Command::Prune => {
            let cutoff = Utc::now() - Duration::days(i64::from(config.database.retention_days));
            let deleted = store.prune(cutoff).await?;
            info!(deleted, retention_days = config.database.retention_days, "prune complete");
            println!("{deleted} observacoes antigas removidas");
        }
    }

    Ok(())
}

fn build_channels(config: &AppConfig) -> vigia::Result<Vec<Arc<dyn NotificationChannel>>> {
    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();

    if config.notifications.console.enabled {
        channels.push(Arc::new(ConsoleChannel::new()));
    }
    if config.notifications.smtp.enabled {
        let email = EmailChannel::new(&config.notifications.smtp.smtp)?;
        channels.push(Arc::new(email));
    }

    info!(channels = channels.len(), "notification channels ready");
    Ok(channels)
}
