//! Server configuration.
//!
//! Built once in `main` from CLI flags / environment variables and shared
//! read-only afterwards.

use std::time::Duration;

/// Binding token lifetime (5 minutes).
pub const DEFAULT_BIND_TTL_SECS: u64 = 300;

/// Upper bound accepted for the binding token lifetime (one day).
pub const MAX_BIND_TTL_SECS: u64 = 86_400;

/// Long-poll window for `getUpdates`.
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Fixed backoff after a failed `getUpdates` fetch.
pub const DEFAULT_POLL_RETRY_SECS: u64 = 5;

/// Pause between two fetches.
pub const DEFAULT_POLL_IDLE_MS: u64 = 100;

/// Public Telegram Bot API endpoint.
pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Deep-link host for `https://t.me/<bot>?start=<token>`.
pub const TELEGRAM_LINK_BASE: &str = "https://t.me";

/// Route the poller posts confirmations to, relative to the backend base.
pub const CONFIRM_PATH: &str = "/api/auth/tg/bind/confirm";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// HS256 secret for credential verification. `None` disables every
    /// authenticated route.
    pub jwt_secret: Option<String>,
    /// Bot API token. `None` disables the poller and the `getMe` lookup.
    pub telegram_bot_token: Option<String>,
    /// Statically configured bot handle (without `@`).
    pub telegram_bot_name: Option<String>,
    pub telegram_api_base: String,
    /// Base URL of the process the poller confirms against.
    pub backend_api_base: String,
    /// SQLite file for accounts. `None` = in-memory.
    pub database_path: Option<String>,
    pub bind_ttl: Duration,
    pub poll_timeout: Duration,
    pub poll_retry: Duration,
    pub poll_idle: Duration,
}

impl ServerConfig {
    /// The bot token, if configured and non-blank.
    pub fn bot_token(&self) -> Option<&str> {
        non_blank(self.telegram_bot_token.as_deref())
    }

    /// The static bot handle, trimmed and without a leading `@`.
    pub fn bot_name(&self) -> Option<&str> {
        non_blank(self.telegram_bot_name.as_deref()).map(|n| n.trim_start_matches('@'))
    }

    /// The signing secret, if configured and non-blank.
    pub fn jwt_secret(&self) -> Option<&str> {
        non_blank(self.jwt_secret.as_deref())
    }

    /// Full URL of the confirm endpoint used by the poller.
    pub fn confirm_url(&self) -> String {
        let base = self.backend_api_base.trim().trim_end_matches('/');
        if base.is_empty() {
            format!("http://localhost:{}{}", self.port, CONFIRM_PATH)
        } else {
            format!("{}{}", base, CONFIRM_PATH)
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            jwt_secret: None,
            telegram_bot_token: None,
            telegram_bot_name: None,
            telegram_api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            backend_api_base: "http://localhost:8080".to_string(),
            database_path: None,
            bind_ttl: Duration::from_secs(DEFAULT_BIND_TTL_SECS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECS),
            poll_retry: Duration::from_secs(DEFAULT_POLL_RETRY_SECS),
            poll_idle: Duration::from_millis(DEFAULT_POLL_IDLE_MS),
        }
    }
}
