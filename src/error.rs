use std::path::PathBuf;

use thiserror::Error;

/// Inbound payload could not be turned into a `Signal`.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("payload is not valid JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),
    #[error("payload must be a JSON object")]
    NotAnObject,
    #[error("field `{field}` has the wrong type: expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `price` is not a decimal number: {0}")]
    BadPrice(String),
}

/// Configuration document could not be read or parsed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config document not found: {}", .0.display())]
    Missing(PathBuf),
    #[error("malformed config document {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to access config document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outbound request to a remote service failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("remote returned HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Ledger write or read failure.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger writer lock poisoned")]
    Poisoned,
}

/// Unexpected fault below the intake boundary.
#[derive(Debug, Error)]
pub enum InternalError {
    #[error("signal processing panicked: {0}")]
    Panicked(String),
    #[error("signal processing task failed: {0}")]
    Task(String),
}

/// Best-effort text of a caught panic payload.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
