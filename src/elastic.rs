//! Elastic client: bulk indexing of normalized events plus the
//! index-template bootstrap for the tenable-signals data stream.

use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};
use crate::models::NormalizedEvent;

/// Per-batch indexing outcome
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub indexed: u64,
    pub failed: u64,
}

/// HTTP client for the search engine, scoped to one run
pub struct ElasticClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    index: String,
}

impl ElasticClient {
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: config.elastic_url.trim_end_matches('/').to_string(),
            username: config.elastic_user.clone(),
            password: config.elastic_pass.clone(),
            index: config.index.clone(),
        })
    }

    /// Install (or overwrite) the index template before the first write
    pub async fn ensure_index_template(&self, name: &str, template: &Value) -> Result<()> {
        let url = format!("{}/_index_template/{}", self.base_url, name);
        let response = self
            .client
            .put(&url)
            .basic_auth(&self.username, Some(&self.password))
            .json(template)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ConnectorError::UnexpectedResponse {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }
        debug!("Index template {} installed", name);
        Ok(())
    }

    /// Submit one batch via the bulk API. Individual document failures are
    /// counted and logged but never abort the batch; only transport-level
    /// failure is an error.
    pub async fn bulk_index(&self, events: &[NormalizedEvent]) -> Result<BulkOutcome> {
        if events.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let payload = build_bulk_body(&self.index, events)?;
        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .header("Content-Type", "application/x-ndjson")
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ConnectorError::UnexpectedResponse {
                endpoint: url,
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = response.json().await?;
        let outcome = summarize_bulk_response(events.len() as u64, &body);
        if outcome.failed > 0 {
            warn!(
                "Bulk request left {} of {} documents unindexed",
                outcome.failed,
                events.len()
            );
            if let Some(reason) = first_bulk_error(&body) {
                debug!("First bulk failure: {}", reason);
            }
        }
        Ok(outcome)
    }
}

/// Build the NDJSON bulk body: one index action line per document line
pub fn build_bulk_body(index: &str, events: &[NormalizedEvent]) -> Result<String> {
    let mut payload = String::new();
    for event in events {
        payload.push_str(&serde_json::to_string(
            &json!({ "index": { "_index": index } }),
        )?);
        payload.push('\n');
        payload.push_str(&serde_json::to_string(event)?);
        payload.push('\n');
    }
    Ok(payload)
}

/// Count per-item failures out of a bulk response
pub fn summarize_bulk_response(total: u64, body: &Value) -> BulkOutcome {
    let errors = body.get("errors").and_then(Value::as_bool).unwrap_or(false);
    if !errors {
        return BulkOutcome {
            indexed: total,
            failed: 0,
        };
    }

    let failed = body
        .get("items")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter(|item| item_error(item).is_some()).count() as u64)
        .unwrap_or(0);

    BulkOutcome {
        indexed: total.saturating_sub(failed),
        failed,
    }
}

fn item_error(item: &Value) -> Option<&Value> {
    item.get("index").and_then(|op| op.get("error"))
}

fn first_bulk_error(body: &Value) -> Option<String> {
    body.get("items")
        .and_then(Value::as_array)?
        .iter()
        .find_map(|item| item_error(item).map(|error| error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_finding;
    use serde_json::json;

    fn sample_events(count: usize) -> Vec<NormalizedEvent> {
        (0..count)
            .map(|i| {
                normalize_finding(&json!({
                    "id": format!("f-{}", i),
                    "updated_at": "2025-08-01T00:00:00Z",
                    "severity": "high"
                }))
            })
            .collect()
    }

    #[test]
    fn test_build_bulk_body_layout() {
        let events = sample_events(2);
        let body = build_bulk_body("tenable-signals-raw", &events).unwrap();

        assert!(body.ends_with('\n'));
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["index"]["_index"], "tenable-signals-raw");

        let doc: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc["@timestamp"], "2025-08-01T00:00:00+00:00");
        assert_eq!(doc["vulnerability"]["severity"], "High");
    }

    #[test]
    fn test_summarize_clean_response() {
        let body = json!({ "errors": false, "items": [] });
        assert_eq!(
            summarize_bulk_response(5, &body),
            BulkOutcome {
                indexed: 5,
                failed: 0
            }
        );
    }

    #[test]
    fn test_summarize_partial_failures() {
        let body = json!({
            "errors": true,
            "items": [
                { "index": { "status": 201 } },
                { "index": { "status": 400, "error": { "type": "mapper_parsing_exception" } } },
                { "index": { "status": 201 } }
            ]
        });
        assert_eq!(
            summarize_bulk_response(3, &body),
            BulkOutcome {
                indexed: 2,
                failed: 1
            }
        );
        assert!(first_bulk_error(&body)
            .unwrap()
            .contains("mapper_parsing_exception"));
    }

    #[test]
    fn test_summarize_missing_items_is_best_effort() {
        let body = json!({ "errors": true });
        assert_eq!(
            summarize_bulk_response(4, &body),
            BulkOutcome {
                indexed: 4,
                failed: 0
            }
        );
    }
}
