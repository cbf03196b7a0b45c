//! Error types for replog

use crate::coordinator::engine::EngineError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Validation Errors ===
    #[error("Invalid join request: {0}")]
    InvalidJoinRequest(String),

    // === Engine Errors ===
    #[error("Failed to initialize consensus engine: {0}")]
    EngineInit(EngineError),

    #[error("Failed to bootstrap cluster configuration: {0}")]
    Bootstrap(EngineError),

    #[error("Self-election did not complete within {0:?}")]
    ElectionTimeout(Duration),

    #[error("Unable to read cluster configuration: {0}")]
    ConfigurationRead(EngineError),

    #[error("Unable to change cluster configuration: {0}")]
    ConfigurationChange(EngineError),

    #[error("Unable to replicate entry: {0}")]
    Replicate(EngineError),

    // === Network Errors ===
    #[error("Join rejected by {leader}: HTTP {status}: {reason}")]
    JoinRejected {
        leader: String,
        status: u16,
        reason: String,
    },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Operation timeout: {0}")]
    Timeout(String),

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Timeout(_) | Error::ConnectionFailed(_) | Error::JoinRejected { .. } => true,
            Error::ConfigurationRead(e) | Error::ConfigurationChange(e) | Error::Replicate(e) => {
                e.is_transient()
            }
            _ => false,
        }
    }

    /// Convert to HTTP status code. Every per-request failure is reported as
    /// a server error; clients retry against a re-resolved leader.
    pub fn to_http_status(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.to_http_status(), self.to_string()).into_response()
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else {
            Error::ConnectionFailed(e.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("engine task failed: {}", e))
    }
}
