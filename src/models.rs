//! Normalized event schema written to the Elastic data stream
//! Field names follow ECS plus the risk extensions declared by the
//! tenable-signals index template; absent source fields stay null.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One finding, normalized for indexing and cross-source correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// UTC RFC 3339 instant, never null
    #[serde(rename = "@timestamp")]
    pub timestamp: String,
    pub event: EventMeta,
    pub vulnerability: Vulnerability,
    pub rule: Rule,
    pub asset: Asset,
    pub host: Host,
    pub cloud: Cloud,
    pub resource: Resource,
    pub labels: Labels,
    pub risk: Risk,
    /// Verbatim copy of the raw finding, kept for traceability
    pub tenable: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMeta {
    pub kind: String,
    pub category: Vec<String>,
    #[serde(rename = "type")]
    pub event_type: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub scanner: Scanner,
    pub severity: Option<String>,
    pub score: Option<f64>,
    pub description: Option<String>,
    pub reference: Option<String>,
    pub category: Option<String>,
    pub cve: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scanner {
    pub vendor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Option<String>,
    pub name: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: Option<String>,
    pub tags: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub os: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cloud {
    pub provider: Option<String>,
    pub account: CloudAccount,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAccount {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub name: Option<String>,
    pub labels: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Labels {
    #[serde(rename = "finding.status")]
    pub finding_status: Option<String>,
    #[serde(rename = "finding.state")]
    pub finding_state: Option<String>,
    #[serde(rename = "exposure.type")]
    pub exposure_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Risk {
    pub score: Option<f64>,
    pub calculated_level: Option<String>,
}

/// Counters accumulated over one connector run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunSummary {
    pub chunks: usize,
    pub findings: u64,
    pub indexed: u64,
    pub failed: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} chunks, {} findings, {} docs indexed, {} failed",
            self.chunks, self.findings, self.indexed, self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_summary_display() {
        let summary = RunSummary {
            chunks: 2,
            findings: 10,
            indexed: 9,
            failed: 1,
        };
        assert_eq!(
            format!("{}", summary),
            "2 chunks, 10 findings, 9 docs indexed, 1 failed"
        );
    }
}
