//! Client error types

use thiserror::Error;

/// Message carried by every product check rejection. External code matches on
/// this exact text.
pub const PRODUCT_CHECK_MESSAGE: &str =
    "The client noticed that the server is not a supported distribution of Elasticsearch";

/// Notice raised once per lineage when the product check is denied by the
/// server's security layer.
pub const DEGRADED_MODE_MESSAGE: &str = "The client is unable to verify that the server is Elasticsearch due to security privileges on the server side. Some functionality may not be compatible if the server is running an unsupported product.";

/// Rejection handed to every caller released under an unsupported verdict or
/// a failed probe.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{}", PRODUCT_CHECK_MESSAGE)]
pub struct GateError;

/// Errors that can occur while talking to a cluster
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error(transparent)]
    ProductCheck(#[from] GateError),

    #[error("Response error: status {status}")]
    Response {
        status: u16,
        body: Option<serde_json::Value>,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            ClientError::ProductCheck(_) => "product_check",
            ClientError::Response { .. } => "response",
            ClientError::Connection(_) => "connection",
            ClientError::Timeout(_) => "timeout",
            ClientError::Serialization(_) => "serialization",
            ClientError::Config(_) => "config",
        }
    }

    /// HTTP status of the server response, if the request got that far
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_product_check(&self) -> bool {
        matches!(self, ClientError::ProductCheck(_))
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(err.to_string())
        } else if err.is_decode() || err.is_body() {
            ClientError::Serialization(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ClientError {
    fn from(err: toml::de::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
