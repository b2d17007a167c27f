use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected response from {endpoint}: status {status}: {body}")]
    UnexpectedResponse {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {endpoint}: {detail}")]
    MalformedResponse { endpoint: String, detail: String },

    #[error("Export job {uuid} ended in state {status}: {payload}")]
    ExportFailed {
        uuid: String,
        status: String,
        payload: Value,
    },

    #[error("Export job {uuid} still not finished after {attempts} status polls")]
    PollExhausted { uuid: String, attempts: u64 },
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
