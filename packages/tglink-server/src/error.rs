//! Error types.
//!
//! `BindError` is what the HTTP surface reports. Each variant carries the
//! numeric code that goes into the response envelope (and is mirrored as
//! the HTTP status):
//!
//! - 400: malformed request, no state change
//! - 401: missing or invalid credential
//! - 404: binding token absent or expired (the two are not distinguished)
//! - 500: server-side failure
//!
//! `TelegramError` covers the outbound Bot API calls made by the poller and
//! the bot identity resolver. It never reaches an HTTP caller; it is only
//! logged.

use thiserror::Error;

/// Result type alias for binding operations.
pub type Result<T> = std::result::Result<T, BindError>;

/// Errors surfaced by the binding handshake and its HTTP routes.
#[derive(Error, Debug)]
pub enum BindError {
    /// Missing, malformed or rejected bearer credential.
    #[error("unauthorized")]
    Unauthorized,

    /// No signing secret configured.
    #[error("server auth not configured")]
    AuthNotConfigured,

    /// Status query without a token.
    #[error("token required")]
    TokenRequired,

    /// Unparseable or incomplete request body.
    #[error("invalid request")]
    InvalidRequest,

    /// Token was never issued or has expired.
    #[error("token not found or expired")]
    NotFound,

    /// The OS entropy source failed while generating a token.
    #[error("failed to generate token")]
    Entropy(String),

    /// The lifetime cannot be applied to the current time.
    #[error("failed to generate token")]
    Lifetime(String),

    /// The token was confirmed but the account could not be updated.
    #[error("failed to update user")]
    AccountUpdate(String),

    /// Account repository failure outside the confirm path.
    #[error("server error")]
    Database(String),
}

impl BindError {
    /// Envelope code for this error.
    pub fn code(&self) -> u16 {
        match self {
            BindError::TokenRequired | BindError::InvalidRequest => 400,
            BindError::Unauthorized => 401,
            BindError::NotFound => 404,
            BindError::AuthNotConfigured
            | BindError::Entropy(_)
            | BindError::Lifetime(_)
            | BindError::AccountUpdate(_)
            | BindError::Database(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for BindError {
    fn from(e: rusqlite::Error) -> Self {
        BindError::Database(e.to_string())
    }
}

/// Errors from calls to the Telegram Bot API.
#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("api returned ok=false: {0}")]
    Rejected(String),
}
