//! tglink server
//!
//! Links logged-in accounts to Telegram users:
//!
//! 1. **Binding API**: issues short-lived binding tokens and deep links,
//!    answers status polls, and accepts confirmations.
//!
//! 2. **Update poller**: long-polls the Telegram Bot API for
//!    `/start <token>` messages and confirms them against the binding API.
//!
//! 3. **Account store**: records the bound Telegram ID on the account.

mod accounts;
mod auth;
mod binding;
mod config;
mod error;
mod state;
mod telegram;

use std::sync::Arc;
use std::time::Duration;

use axum::{http::Method, response::IntoResponse, routing::get, Json, Router};
use clap::Parser;
use serde_json::json;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use accounts::SqliteAccountRepository;
use config::{
    ServerConfig, DEFAULT_BIND_TTL_SECS, DEFAULT_POLL_IDLE_MS, DEFAULT_POLL_RETRY_SECS,
    DEFAULT_POLL_TIMEOUT_SECS, DEFAULT_TELEGRAM_API_BASE, MAX_BIND_TTL_SECS,
};
use state::AppState;
use telegram::UpdatePoller;

// ── CLI Arguments ─────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tglink-server", version, about = "Telegram account binding server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = 8080, env = "PORT")]
    port: u16,

    /// HS256 secret for bearer credentials. Authenticated routes answer
    /// "server auth not configured" without it.
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,

    /// Telegram Bot API token. Without it the poller does not run.
    #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
    telegram_bot_token: Option<String>,

    /// Bot handle used in deep links. Looked up via getMe when unset.
    #[arg(long, env = "TELEGRAM_BOT_NAME")]
    telegram_bot_name: Option<String>,

    /// Telegram Bot API base URL
    #[arg(long, default_value = DEFAULT_TELEGRAM_API_BASE, env = "TELEGRAM_API_BASE")]
    telegram_api_base: String,

    /// Base URL the poller posts confirmations to.
    /// Defaults to http://localhost:<port>.
    #[arg(long, env = "BACKEND_API_BASE")]
    backend_api_base: Option<String>,

    /// SQLite database file for accounts (in-memory when unset)
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,

    /// Binding token lifetime in seconds (1 to 86400)
    #[arg(
        long,
        default_value_t = DEFAULT_BIND_TTL_SECS,
        env = "BIND_TTL_SECS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_BIND_TTL_SECS)
    )]
    bind_ttl_secs: u64,

    /// getUpdates long-poll timeout in seconds
    #[arg(long, default_value_t = DEFAULT_POLL_TIMEOUT_SECS, env = "POLL_TIMEOUT_SECS")]
    poll_timeout_secs: u64,

    /// Pause after a failed getUpdates call, in seconds
    #[arg(long, default_value_t = DEFAULT_POLL_RETRY_SECS, env = "POLL_RETRY_SECS")]
    poll_retry_secs: u64,

    /// Pause between successful getUpdates calls, in milliseconds
    #[arg(long, default_value_t = DEFAULT_POLL_IDLE_MS, env = "POLL_IDLE_MS")]
    poll_idle_ms: u64,

    /// Accounts to create at startup (comma-separated emails).
    /// Example: alice@example.com,bob@example.com
    #[arg(long, env = "SEED_ACCOUNTS", value_delimiter = ',')]
    seed_account: Vec<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        let backend_api_base = self
            .backend_api_base
            .unwrap_or_else(|| format!("http://localhost:{}", self.port));
        ServerConfig {
            port: self.port,
            jwt_secret: self.jwt_secret,
            telegram_bot_token: self.telegram_bot_token,
            telegram_bot_name: self.telegram_bot_name,
            telegram_api_base: self.telegram_api_base,
            backend_api_base,
            database_path: self.database_path,
            bind_ttl: Duration::from_secs(self.bind_ttl_secs),
            poll_timeout: Duration::from_secs(self.poll_timeout_secs),
            poll_retry: Duration::from_secs(self.poll_retry_secs),
            poll_idle: Duration::from_millis(self.poll_idle_ms),
        }
    }
}

// ── Entry Point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tglink_server=info,tower_http=info".into());
    if args.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let seeds: Vec<String> = args
        .seed_account
        .iter()
        .map(|email| email.trim().to_string())
        .filter(|email| !email.is_empty())
        .collect();
    let config = args.into_config();

    if config.jwt_secret().is_none() {
        tracing::warn!("JWT_SECRET not set, authenticated routes are disabled");
    }

    let accounts = SqliteAccountRepository::open(config.database_path.as_deref())
        .expect("Failed to open account database");

    for email in &seeds {
        seed_account(&accounts, &config, email);
    }

    let http = reqwest::Client::new();
    let state = AppState::new(config.clone(), Arc::new(accounts), http.clone());

    // ── Telegram Poller ───────────────────────────────────────────────────

    let (stop_tx, stop_rx) = watch::channel(false);
    let poller_handle = match UpdatePoller::from_config(&config, http) {
        Some(poller) => Some(tokio::spawn(poller.run(stop_rx))),
        None => {
            tracing::info!("Telegram poller disabled (no bot token configured)");
            None
        }
    };

    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("tglink server starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    let _ = stop_tx.send(true);
    if let Some(handle) = poller_handle {
        let _ = handle.await;
    }
    tracing::info!("tglink server stopped");
}

/// Create a seed account and log a credential for it when signing is
/// configured.
fn seed_account(accounts: &SqliteAccountRepository, config: &ServerConfig, email: &str) {
    let account_id = match accounts.ensure_account(email) {
        Ok(id) => id,
        Err(e) => {
            tracing::error!(email, error = %e, "Failed to seed account");
            return;
        }
    };

    match config.jwt_secret() {
        Some(secret) => match auth::issue_token(secret, account_id, email) {
            Ok(credential) => tracing::info!(
                account_id,
                email,
                credential = credential.as_str(),
                "Seeded account"
            ),
            Err(e) => tracing::warn!(account_id, email, error = %e, "Seeded account, no credential"),
        },
        None => tracing::info!(account_id, email, "Seeded account"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .merge(binding::api::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Route Handlers ────────────────────────────────────────────────────────────

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "tglink-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;

    #[test]
    fn test_default_args() {
        let args = Args::try_parse_from(["tglink-server"]).unwrap();
        let config = args.into_config();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_ttl, Duration::from_secs(300));
        assert_eq!(config.telegram_api_base, "https://api.telegram.org");
        assert_eq!(
            config.confirm_url(),
            "http://localhost:8080/api/auth/tg/bind/confirm"
        );
    }

    #[test]
    fn test_args_override() {
        let args = Args::try_parse_from([
            "tglink-server",
            "--port",
            "9090",
            "--telegram-bot-name",
            "@select_bot",
            "--backend-api-base",
            "http://backend:3000",
            "--poll-retry-secs",
            "1",
            "--seed-account",
            "a@example.com,b@example.com",
        ])
        .unwrap();
        assert_eq!(args.seed_account, vec!["a@example.com", "b@example.com"]);

        let config = args.into_config();
        assert_eq!(config.port, 9090);
        assert_eq!(config.bot_name(), Some("select_bot"));
        assert_eq!(config.poll_retry, Duration::from_secs(1));
        assert_eq!(
            config.confirm_url(),
            "http://backend:3000/api/auth/tg/bind/confirm"
        );
    }

    #[test]
    fn test_bind_ttl_bounds() {
        for bad in ["0", "86401", "1000000000000000", "18446744073709551615"] {
            assert!(
                Args::try_parse_from(["tglink-server", "--bind-ttl-secs", bad]).is_err(),
                "accepted {}",
                bad
            );
        }

        let args = Args::try_parse_from(["tglink-server", "--bind-ttl-secs", "86400"]).unwrap();
        assert_eq!(args.into_config().bind_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_seed_account_is_idempotent() {
        let accounts = SqliteAccountRepository::open(None).unwrap();
        let config = ServerConfig {
            jwt_secret: Some("secret".into()),
            ..ServerConfig::default()
        };
        seed_account(&accounts, &config, "seed@example.com");
        seed_account(&accounts, &config, "seed@example.com");
        let first = accounts.ensure_account("seed@example.com").unwrap();
        assert_eq!(accounts.ensure_account("SEED@example.com").unwrap(), first);
    }

    #[tokio::test]
    async fn test_health() {
        let accounts = SqliteAccountRepository::open(None).unwrap();
        let state = AppState::new(
            ServerConfig::default(),
            Arc::new(accounts),
            reqwest::Client::new(),
        );
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["service"], "tglink-server");
    }
}
