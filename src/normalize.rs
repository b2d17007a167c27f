//! Mapping of raw Tenable findings onto the normalized event schema
//! The export API is beta and its record shape is not contractual, so
//! every lookup is a primary-then-fallback chain that degrades to null.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::models::{
    Asset, Cloud, CloudAccount, EventMeta, Host, Labels, NormalizedEvent, Resource, Risk, Rule,
    Scanner, Vulnerability,
};

/// Normalize one raw finding. Total: no input shape makes this fail.
pub fn normalize_finding(finding: &Value) -> NormalizedEvent {
    let now = Utc::now();

    let severity_raw = finding
        .get("severity")
        .and_then(Value::as_str)
        .map(str::to_lowercase)
        .filter(|s| !s.is_empty());

    let score = finding
        .get("risk_score")
        .and_then(Value::as_f64)
        .or_else(|| {
            finding
                .get("cvss")
                .and_then(|c| c.get("base_score"))
                .and_then(Value::as_f64)
        });

    let rule = finding.get("rule");
    let category = finding.get("category").and_then(coerce_str);
    let rule_id = rule
        .and_then(|r| r.get("id"))
        .and_then(coerce_str)
        .or_else(|| finding.get("rule_id").and_then(coerce_str));

    let asset = finding.get("asset");
    let cloud = finding
        .get("cloud")
        .filter(|c| c.is_object())
        .or_else(|| asset.and_then(|a| a.get("cloud")).filter(|c| c.is_object()));
    let resource = finding.get("resource");

    NormalizedEvent {
        timestamp: resolve_timestamp(finding, now),
        event: EventMeta {
            kind: "state".to_string(),
            category: vec!["vulnerability".to_string()],
            event_type: vec!["info".to_string()],
        },
        vulnerability: Vulnerability {
            id: ["id", "finding_id", "signal_id"]
                .iter()
                .find_map(|key| finding.get(*key).and_then(coerce_str))
                .unwrap_or_default(),
            scanner: Scanner {
                vendor: "Tenable".to_string(),
            },
            severity: severity_raw.as_deref().map(capitalize),
            score,
            description: finding
                .get("description")
                .and_then(coerce_str)
                .or_else(|| finding.get("title").and_then(coerce_str)),
            reference: rule_id.clone(),
            category: category.clone(),
            cve: resolve_cves(finding),
        },
        rule: Rule {
            id: rule_id,
            name: rule
                .and_then(|r| r.get("name"))
                .and_then(coerce_str)
                .or_else(|| finding.get("signal_name").and_then(coerce_str)),
            category: rule
                .and_then(|r| r.get("category"))
                .and_then(coerce_str)
                .or(category),
        },
        asset: Asset {
            id: asset
                .and_then(|a| a.get("uuid"))
                .and_then(coerce_str)
                .or_else(|| asset.and_then(|a| a.get("id")).and_then(coerce_str)),
            tags: asset
                .and_then(|a| a.get("tags"))
                .filter(|t| !t.is_null())
                .cloned(),
        },
        host: Host {
            hostname: asset
                .and_then(|a| a.get("fqdn"))
                .and_then(coerce_str)
                .or_else(|| asset.and_then(|a| a.get("hostname")).and_then(coerce_str)),
            ip: asset
                .and_then(|a| a.get("ipv4"))
                .and_then(coerce_str)
                .or_else(|| asset.and_then(|a| a.get("ip")).and_then(coerce_str)),
            os: asset
                .and_then(|a| a.get("operating_system"))
                .and_then(coerce_str),
        },
        cloud: Cloud {
            provider: cloud.and_then(|c| c.get("provider")).and_then(coerce_str),
            account: CloudAccount {
                id: cloud.and_then(|c| c.get("account_id")).and_then(coerce_str),
                name: cloud
                    .and_then(|c| c.get("account_name"))
                    .and_then(coerce_str),
            },
            region: cloud.and_then(|c| c.get("region")).and_then(coerce_str),
        },
        resource: Resource {
            id: resource.and_then(|r| r.get("id")).and_then(coerce_str),
            resource_type: resource.and_then(|r| r.get("type")).and_then(coerce_str),
            name: resource.and_then(|r| r.get("name")).and_then(coerce_str),
            labels: resource
                .and_then(|r| r.get("labels"))
                .filter(|l| !l.is_null())
                .cloned(),
        },
        labels: Labels {
            finding_status: finding.get("status").and_then(coerce_str),
            finding_state: finding.get("state").and_then(coerce_str),
            exposure_type: finding.get("exposure_type").and_then(coerce_str),
        },
        risk: Risk {
            score,
            calculated_level: severity_raw,
        },
        tenable: finding.clone(),
    }
}

/// `updated_at`, then `created_at`, then now; parse failures fall back to now
fn resolve_timestamp(finding: &Value, now: DateTime<Utc>) -> String {
    finding
        .get("updated_at")
        .and_then(Value::as_str)
        .or_else(|| finding.get("created_at").and_then(Value::as_str))
        .and_then(parse_utc)
        .unwrap_or(now)
        .to_rfc3339()
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Timestamps without an offset are taken as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `cve` as list or scalar, else `references.cve`; empty results become null
fn resolve_cves(finding: &Value) -> Option<Vec<String>> {
    let cves: Vec<String> = match finding.get("cve") {
        Some(Value::Array(list)) => list.iter().filter_map(coerce_str).collect(),
        Some(value) => coerce_str(value).into_iter().collect(),
        None => finding
            .get("references")
            .and_then(|r| r.get("cve"))
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(coerce_str).collect())
            .unwrap_or_default(),
    };
    if cves.is_empty() {
        None
    } else {
        Some(cves)
    }
}

fn coerce_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
