use std::io::ErrorKind;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GemtrailError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported scheme '{scheme}' in {uri}")]
    UnsupportedScheme { scheme: String, uri: String },

    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("{message} (status {status})")]
    Protocol { status: u8, message: String },

    #[error("Gave up on {uri} after {attempts} attempts: {message}")]
    RetriesExhausted {
        uri: String,
        attempts: u32,
        message: String,
    },

    #[error("Redirect to {0} was not followed")]
    RedirectNotFollowed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl GemtrailError {
    /// Whether a client-side failure is worth another attempt.
    ///
    /// Timeouts and failed or dropped connections are treated like a
    /// server's temporary failure; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            GemtrailError::Timeout(_) => true,
            GemtrailError::Io(e) => matches!(
                e.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, GemtrailError>;
