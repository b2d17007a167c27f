//! Tenable One inventory export client
//! Starts the asynchronous export job, polls it to a terminal state and
//! downloads/decodes the result chunks.

use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, Result};

const EXPORT_ENDPOINT: &str = "/api/v1/t1/inventory/export/findings";

/// Observed lifecycle state of an export job
#[derive(Debug, Clone, PartialEq)]
pub enum ExportState {
    Running(String),
    Finished(Vec<u64>),
    Failed { status: String },
}

/// Parameters for starting an export job
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub format: String,
    pub compression: Option<String>,
    pub filters: Option<Value>,
}

impl ExportRequest {
    /// Build the request from config, assembling the filter predicate
    pub fn from_config(config: &ConnectorConfig) -> Self {
        let mut filters = serde_json::Map::new();
        if !config.severity.is_empty() {
            filters.insert("severity".to_string(), json!(config.severity));
        }
        if let Some(since) = &config.updated_since {
            filters.insert("updated_at".to_string(), json!({ "gte": since }));
        }

        Self {
            format: config.format.clone(),
            compression: config.compression.clone(),
            filters: if filters.is_empty() {
                None
            } else {
                Some(Value::Object(filters))
            },
        }
    }

    fn body(&self) -> Value {
        let mut body = serde_json::Map::new();
        body.insert("format".to_string(), json!(self.format));
        if let Some(compression) = &self.compression {
            body.insert("compression".to_string(), json!(compression));
        }
        if let Some(filters) = &self.filters {
            body.insert("filters".to_string(), filters.clone());
        }
        Value::Object(body)
    }
}

/// HTTP client for the export API, scoped to one run
pub struct TenableClient {
    client: Client,
    base_url: String,
    download_timeout: Duration,
}

impl TenableClient {
    pub fn new(config: &ConnectorConfig) -> Result<Self> {
        let api_keys = format!(
            "accessKey={}; secretKey={}",
            config.access_key, config.secret_key
        );
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-ApiKeys",
            HeaderValue::from_str(&api_keys).map_err(|_| {
                ConnectorError::Config("API keys contain characters not valid in a header".into())
            })?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.tenable_url.trim_end_matches('/').to_string(),
            download_timeout: Duration::from_secs(config.download_timeout),
        })
    }

    /// Start an export job and return its opaque identifier.
    /// Job creation is not retried: it is not assumed safe to repeat blindly.
    pub async fn start_export(&self, request: &ExportRequest) -> Result<String> {
        let url = format!("{}{}", self.base_url, EXPORT_ENDPOINT);
        let response = self.client.post(&url).json(&request.body()).send().await?;
        let response = check_status(response, &url).await?;
        let payload: Value = response.json().await?;

        payload
            .get("export_uuid")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::MalformedResponse {
                endpoint: url,
                detail: format!("no export_uuid in {}", payload),
            })
    }

    /// One status query, returning the raw payload
    pub async fn export_status(&self, uuid: &str) -> Result<Value> {
        let url = format!("{}{}/{}/status", self.base_url, EXPORT_ENDPOINT, uuid);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response, &url).await?;
        Ok(response.json().await?)
    }

    /// Poll until the job reaches a terminal state and return the chunk list.
    /// `max_polls` of 0 polls forever; otherwise exhaustion is its own error.
    pub async fn wait_until_finished(
        &self,
        uuid: &str,
        poll_interval: Duration,
        max_polls: u64,
    ) -> Result<Vec<u64>> {
        let mut attempts: u64 = 0;
        loop {
            let payload = self.export_status(uuid).await?;
            attempts += 1;

            match classify_status(&payload) {
                ExportState::Finished(chunks) => {
                    info!("Export {} finished, {} chunks available", uuid, chunks.len());
                    return Ok(chunks);
                }
                ExportState::Failed { status } => {
                    return Err(ConnectorError::ExportFailed {
                        uuid: uuid.to_string(),
                        status,
                        payload,
                    });
                }
                ExportState::Running(status) => {
                    if max_polls > 0 && attempts >= max_polls {
                        return Err(ConnectorError::PollExhausted {
                            uuid: uuid.to_string(),
                            attempts,
                        });
                    }
                    debug!(
                        "Export {} still {}, next poll in {:?}",
                        uuid, status, poll_interval
                    );
                    tokio::time::sleep(poll_interval).await;
                }
            }
        }
    }

    /// Download one chunk and decode it into raw finding records
    pub async fn download_chunk(&self, uuid: &str, chunk_id: u64) -> Result<Vec<Value>> {
        let url = format!(
            "{}{}/{}/download/{}",
            self.base_url, EXPORT_ENDPOINT, uuid, chunk_id
        );
        let response = self
            .client
            .get(&url)
            .timeout(self.download_timeout)
            .send()
            .await?;
        let response = check_status(response, &url).await?;

        let gzipped = is_gzip(response.headers());
        let bytes = response.bytes().await?;
        let bytes = if gzipped {
            gunzip(&bytes)?
        } else {
            bytes.to_vec()
        };

        let text = String::from_utf8_lossy(&bytes);
        parse_chunk_text(&text)
    }
}

/// Classify a status payload, tolerating the two field-name variants
/// the API has shipped (`status`/`state`, `chunks_available`/`chunks`)
pub fn classify_status(payload: &Value) -> ExportState {
    let status = payload
        .get("status")
        .and_then(Value::as_str)
        .or_else(|| payload.get("state").and_then(Value::as_str))
        .unwrap_or("RUNNING")
        .to_uppercase();

    match status.as_str() {
        "FINISHED" => ExportState::Finished(chunk_ids(payload)),
        "ERROR" | "CANCELLED" | "FAILED" => ExportState::Failed { status },
        _ => ExportState::Running(status),
    }
}

fn chunk_ids(payload: &Value) -> Vec<u64> {
    payload
        .get("chunks_available")
        .and_then(Value::as_array)
        .or_else(|| payload.get("chunks").and_then(Value::as_array))
        .map(|items| items.iter().filter_map(chunk_id).collect())
        .unwrap_or_default()
}

fn chunk_id(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Parse chunk text as a JSON array or as newline-delimited JSON
pub fn parse_chunk_text(text: &str) -> Result<Vec<Value>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let records: Vec<Value> = serde_json::from_str(trimmed)?;
        return Ok(records);
    }

    let mut records = Vec::new();
    for line in trimmed.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

fn is_gzip(headers: &HeaderMap) -> bool {
    let encoding = headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    encoding.eq_ignore_ascii_case("gzip") || content_type.ends_with("gzip")
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut decoded = Vec::new();
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

async fn check_status(response: reqwest::Response, endpoint: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(ConnectorError::UnexpectedResponse {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_classify_finished_with_chunk_list() {
        let state = classify_status(&json!({ "status": "FINISHED", "chunks_available": [1, 2] }));
        assert_eq!(state, ExportState::Finished(vec![1, 2]));
    }

    #[test]
    fn test_classify_failed_is_terminal() {
        let state = classify_status(&json!({ "status": "FAILED" }));
        assert_eq!(
            state,
            ExportState::Failed {
                status: "FAILED".to_string()
            }
        );

        let state = classify_status(&json!({ "state": "cancelled" }));
        assert_eq!(
            state,
            ExportState::Failed {
                status: "CANCELLED".to_string()
            }
        );
    }

    #[test]
    fn test_classify_tolerates_alternate_field_names() {
        let state = classify_status(&json!({ "state": "finished", "chunks": [3] }));
        assert_eq!(state, ExportState::Finished(vec![3]));
    }

    #[test]
    fn test_classify_missing_status_is_running() {
        let state = classify_status(&json!({}));
        assert_eq!(state, ExportState::Running("RUNNING".to_string()));

        let state = classify_status(&json!({ "status": "PROCESSING" }));
        assert_eq!(state, ExportState::Running("PROCESSING".to_string()));
    }

    #[test]
    fn test_chunk_ids_accept_string_values() {
        let state = classify_status(&json!({ "status": "FINISHED", "chunks_available": ["4", 5] }));
        assert_eq!(state, ExportState::Finished(vec![4, 5]));
    }

    #[test]
    fn test_finished_without_chunks_is_empty() {
        let state = classify_status(&json!({ "status": "FINISHED" }));
        assert_eq!(state, ExportState::Finished(vec![]));
    }

    #[test]
    fn test_parse_chunk_json_array() {
        let records = parse_chunk_text(r#"[{"id": "a"}, {"id": "b"}]"#).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "a");
        assert_eq!(records[1]["id"], "b");
    }

    #[test]
    fn test_parse_chunk_ndjson_skips_blank_lines() {
        let text = "{\"id\": 1}\n{\"id\": 2}\n\n{\"id\": 3}\n";
        let records = parse_chunk_text(text).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2]["id"], 3);
    }

    #[test]
    fn test_parse_chunk_empty_text() {
        assert!(parse_chunk_text("").unwrap().is_empty());
        assert!(parse_chunk_text("  \n \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_chunk_invalid_json_is_error() {
        assert!(parse_chunk_text("{not json}").is_err());
        assert!(parse_chunk_text("[{\"id\": 1}").is_err());
    }

    #[test]
    fn test_gunzip_roundtrip() {
        let original = br#"[{"id": "gz"}]"#;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(original).unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = gunzip(&compressed).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_is_gzip_header_detection() {
        let mut headers = HeaderMap::new();
        assert!(!is_gzip(&headers));

        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        assert!(is_gzip(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/gzip"));
        assert!(is_gzip(&headers));

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_gzip(&headers));
    }

    #[test]
    fn test_export_request_body() {
        let request = ExportRequest {
            format: "json".to_string(),
            compression: Some("gzip".to_string()),
            filters: Some(json!({ "severity": ["critical", "high"] })),
        };
        let body = request.body();
        assert_eq!(body["format"], "json");
        assert_eq!(body["compression"], "gzip");
        assert_eq!(body["filters"]["severity"], json!(["critical", "high"]));

        let request = ExportRequest {
            format: "json".to_string(),
            compression: None,
            filters: None,
        };
        let body = request.body();
        assert!(body.get("compression").is_none());
        assert!(body.get("filters").is_none());
    }
}
