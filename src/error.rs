//! Error types for fastpay-sync

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected with status {status}: {body}")]
    Upload { status: u16, body: String },

    #[error("Upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Processor requires configuration: {0}")]
    ConfigurationRequired(String),

    #[error("Unknown merge processor: {0}")]
    UnknownProcessor(String),
}

pub type Result<T> = std::result::Result<T, Error>;
