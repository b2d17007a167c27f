//! Tenable One findings export connector
//! Pulls asynchronous findings exports from the Tenable One inventory API,
//! normalizes each finding into the ECS-style SIEM event schema and
//! bulk-loads the result into an Elastic index or data stream.

pub mod config;
pub mod elastic;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod tenable;

// Re-export commonly used types
pub use config::ConnectorConfig;
pub use elastic::{BulkOutcome, ElasticClient};
pub use error::{ConnectorError, Result};
pub use models::{NormalizedEvent, RunSummary};
pub use tenable::{ExportRequest, ExportState, TenableClient};
