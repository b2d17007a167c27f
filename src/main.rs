//! Tenable One findings export connector
//! Pulls an asynchronous findings export, normalizes each record and
//! bulk-loads the batch into the Elastic tenable-signals index.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siem_tenable_connector::config::ConnectorConfig;
use siem_tenable_connector::elastic::ElasticClient;
use siem_tenable_connector::pipeline;
use siem_tenable_connector::tenable::TenableClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "siem_tenable_connector=info,tenable_connector=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConnectorConfig::parse();
    config.validate()?;

    info!("Starting Tenable findings connector");
    info!("{}", config);

    let tenable = TenableClient::new(&config)?;
    let elastic = ElasticClient::new(&config)?;

    let summary = pipeline::run(&config, &tenable, &elastic).await?;
    info!("Run complete: {}", summary);
    Ok(())
}
