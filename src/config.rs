//! Runtime configuration for the findings connector
//! Every credential and endpoint can come from the environment; tuning
//! knobs double as CLI flags.

use clap::Parser;
use std::fmt;

#[derive(Parser, Clone, Debug)]
#[command(name = "tenable-connector", about = "Tenable One findings export to Elastic")]
#[command(version, author = "SIEM Team")]
pub struct ConnectorConfig {
    /// Tenable API access key
    #[arg(long, env = "TENABLE_ACCESS_KEY", hide_env_values = true)]
    pub access_key: String,

    /// Tenable API secret key
    #[arg(long, env = "TENABLE_SECRET_KEY", hide_env_values = true)]
    pub secret_key: String,

    /// Tenable API base URL
    #[arg(long, env = "TENABLE_API_URL", default_value = "https://cloud.tenable.com")]
    pub tenable_url: String,

    /// Elasticsearch base URL
    #[arg(long, env = "ELASTIC_URL")]
    pub elastic_url: String,

    /// Elasticsearch username
    #[arg(long, env = "ELASTIC_USER")]
    pub elastic_user: String,

    /// Elasticsearch password
    #[arg(long, env = "ELASTIC_PASS", hide_env_values = true)]
    pub elastic_pass: String,

    /// Target index or data stream name
    #[arg(long, env = "INDEX", default_value = "tenable-signals-raw")]
    pub index: String,

    /// Export output format requested from the API
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Ask the export API to compress chunks (e.g. gzip)
    #[arg(long)]
    pub compression: Option<String>,

    /// Only export findings with these severities (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub severity: Vec<String>,

    /// Only export findings updated at or after this RFC 3339 instant
    #[arg(long)]
    pub updated_since: Option<String>,

    /// Seconds to sleep between status polls
    #[arg(long, env = "TENABLE_POLL_INTERVAL", default_value = "5")]
    pub poll_interval: u64,

    /// Maximum status polls before giving up (0 = poll forever)
    #[arg(long, env = "TENABLE_MAX_POLLS", default_value = "720")]
    pub max_polls: u64,

    /// HTTP timeout for export and status calls (seconds)
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// HTTP timeout for chunk downloads (seconds)
    #[arg(long, default_value = "120")]
    pub download_timeout: u64,

    /// Index template file to install before the run
    #[arg(long)]
    pub template_file: Option<String>,

    /// Name to install the index template under
    #[arg(long, default_value = "tenable-signals")]
    pub template_name: String,

    /// Fetch and normalize without indexing
    #[arg(long)]
    pub dry_run: bool,
}

impl ConnectorConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.tenable_url.starts_with("http://") && !self.tenable_url.starts_with("https://") {
            anyhow::bail!("Tenable URL must be a valid HTTP/HTTPS URL");
        }

        if !self.elastic_url.starts_with("http://") && !self.elastic_url.starts_with("https://") {
            anyhow::bail!("Elastic URL must be a valid HTTP/HTTPS URL");
        }

        if self.index.is_empty() {
            anyhow::bail!("Index name must not be empty");
        }

        if self.format.is_empty() {
            anyhow::bail!("Export format must not be empty");
        }

        if self.poll_interval == 0 {
            anyhow::bail!("Poll interval must be greater than 0");
        }

        if self.timeout == 0 || self.download_timeout == 0 {
            anyhow::bail!("HTTP timeouts must be greater than 0");
        }

        if let Some(since) = &self.updated_since {
            if chrono::DateTime::parse_from_rfc3339(since).is_err() {
                anyhow::bail!("Invalid --updated-since value: {}", since);
            }
        }

        Ok(())
    }
}

impl fmt::Display for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectorConfig {{ tenable: {}, elastic: {}, index: {}, format: {}, poll_interval: {}s, max_polls: {} }}",
            self.tenable_url, self.elastic_url, self.index, self.format, self.poll_interval, self.max_polls
        )
    }
}
