//! Error types for tt-client

use thiserror::Error;

use crate::transport::TransportError;

/// Request outcome errors surfaced to callers
#[derive(Debug, Error)]
pub enum ClientError {
    /// No HTTP response was obtained (never retried)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Access token rejected and the refresh attempt did not recover it
    #[error("Your login session has expired, please sign in again")]
    SessionExpired,

    /// Backend answered with a failure status other than 401
    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Successful status but missing required data
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Request descriptor could not be turned into an HTTP request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// tt-common error (input validation, configuration, IO)
    #[error(transparent)]
    Common(#[from] tt_common::Error),
}

impl ClientError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::SessionExpired => Some(401),
            _ => None,
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
