//! Error handling for the marketplace service

use std::fmt;

use axum::http::StatusCode;
use marketplace_auth::AuthError;
use marketplace_postgrest::PostgrestError;
use thiserror::Error;

/// Unified error type for the marketplace service
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed input
    #[error("{0}")]
    Validation(String),

    /// Missing credentials, or acting on something the caller does not own
    #[error("{0}")]
    Unauthorized(String),

    /// Entity absent
    #[error("{0}")]
    NotFound(String),

    /// Remote store failures
    #[error("Database error: {0}")]
    Store(#[from] PostgrestError),

    /// Token verification failures
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// HTTP client construction errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation<T: fmt::Display>(msg: T) -> Self {
        Error::Validation(msg.to_string())
    }

    pub fn unauthorized<T: fmt::Display>(msg: T) -> Self {
        Error::Unauthorized(msg.to_string())
    }

    pub fn not_found<T: fmt::Display>(msg: T) -> Self {
        Error::NotFound(msg.to_string())
    }

    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Error::Internal(msg.to_string())
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Auth(err) if err.is_credential_error() => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller; server side details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(msg) | Error::Unauthorized(msg) | Error::NotFound(msg) => {
                msg.clone()
            }
            Error::Auth(err) if err.is_credential_error() => "Unauthorized".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}
