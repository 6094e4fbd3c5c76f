//! Error types shared by the core and the web frontend

use thiserror::Error;

/// Failures talking to the remote ornament store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store response was not a row list: {0}")]
    Decode(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether the store rejected a write because the table lacks `column`.
    ///
    /// PostgREST reports this as `PGRST204` (schema cache miss) or passes
    /// through Postgres `42703` (undefined column).
    pub fn is_unknown_column(&self, column: &str) -> bool {
        match self {
            StoreError::Status { body, .. } => {
                (body.contains("PGRST204") || body.contains("42703")) && body.contains(column)
            }
            _ => false,
        }
    }
}

/// Invalid or missing store configuration. Fatal at startup.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("store URL is not set (ORNAMENT_STORE_URL)")]
    MissingUrl,
    #[error("store access key is not set (ORNAMENT_STORE_KEY)")]
    MissingKey,
    #[error("store URL must start with http:// or https://, got {0:?}")]
    InvalidUrl(String),
}

/// Rejected form submission
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FormError {
    #[error("message is empty")]
    EmptyMessage,
}

/// Realtime frame that could not be understood
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed realtime frame: {0}")]
    Malformed(#[from] serde_json::Error),
}
