//! Sequential run orchestration: export, poll, download, normalize, index.
//! Clients are injected so the whole run can be driven against mock servers.

use std::time::Duration;

use tracing::info;

use crate::config::ConnectorConfig;
use crate::elastic::ElasticClient;
use crate::error::Result;
use crate::models::{NormalizedEvent, RunSummary};
use crate::normalize::normalize_finding;
use crate::tenable::{ExportRequest, TenableClient};

/// Run one export-to-index cycle and return the accumulated counters
pub async fn run(
    config: &ConnectorConfig,
    tenable: &TenableClient,
    elastic: &ElasticClient,
) -> Result<RunSummary> {
    if let Some(path) = &config.template_file {
        let raw = std::fs::read_to_string(path)?;
        let template: serde_json::Value = serde_json::from_str(&raw)?;
        elastic
            .ensure_index_template(&config.template_name, &template)
            .await?;
        info!("Index template {} ensured from {}", config.template_name, path);
    }

    let request = ExportRequest::from_config(config);
    let uuid = tenable.start_export(&request).await?;
    info!("Export started: {}", uuid);

    let chunks = tenable
        .wait_until_finished(
            &uuid,
            Duration::from_secs(config.poll_interval),
            config.max_polls,
        )
        .await?;

    let mut summary = RunSummary::default();
    for chunk_id in chunks {
        let findings = tenable.download_chunk(&uuid, chunk_id).await?;
        let events: Vec<NormalizedEvent> = findings.iter().map(normalize_finding).collect();
        summary.chunks += 1;
        summary.findings += events.len() as u64;

        if config.dry_run {
            info!(
                "Chunk {}: {} findings normalized (dry run, not indexed)",
                chunk_id,
                events.len()
            );
            continue;
        }

        let outcome = elastic.bulk_index(&events).await?;
        summary.indexed += outcome.indexed;
        summary.failed += outcome.failed;
        info!(
            "Chunk {}: {} docs indexed, {} failed",
            chunk_id, outcome.indexed, outcome.failed
        );
    }

    Ok(summary)
}
