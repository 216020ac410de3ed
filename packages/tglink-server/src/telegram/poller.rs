//! Telegram update poller.
//!
//! Long-polls `getUpdates` for `/start <token>` messages and forwards each
//! one to the confirm endpoint as `{token, telegram_id}`.
//!
//! ## Loop
//!
//! ```text
//!   ┌──────────────┐  ok     ┌──────────────────────┐
//!   │ getUpdates   │───────► │ advance offset,      │──► sleep idle ─┐
//!   │ (offset, 30s)│         │ confirm /start msgs  │                │
//!   └──────┬───────┘         └──────────────────────┘                │
//!          │ error                                                    │
//!          └──────────────────► sleep retry (offset unchanged) ───────┤
//!   ▲                                                                 │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Fetch failures are retried forever at a fixed interval. Confirm calls
//! are fire-and-forget: a failure is logged and the user can resend the
//! command. The loop ends only when the stop signal fires; a stop that
//! arrives while confirms are in flight lets them finish first.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tokio::sync::watch;

use super::client::BotApi;
use super::types::Update;
use crate::binding::token_preview;
use crate::config::ServerConfig;
use crate::error::TelegramError;

/// The command carrying a binding token.
pub const START_COMMAND: &str = "/start";

#[derive(Debug, Serialize)]
struct ConfirmPayload<'a> {
    token: &'a str,
    telegram_id: String,
}

/// Extract the binding token from a `/start <token>` message.
///
/// The text must begin with `/start` in any case; the second
/// whitespace-separated word is returned verbatim.
pub fn parse_start_command(text: &str) -> Option<&str> {
    let text = text.trim();
    if !text.to_lowercase().starts_with(START_COMMAND) {
        return None;
    }
    text.split_whitespace().nth(1)
}

/// Background poller for bot updates.
pub struct UpdatePoller {
    api: BotApi,
    client: Client,
    confirm_url: String,
    poll_timeout: Duration,
    retry_interval: Duration,
    idle_interval: Duration,
    offset: i64,
}

impl UpdatePoller {
    /// Build a poller from config. `None` when no bot token is configured,
    /// which disables the feature.
    pub fn from_config(config: &ServerConfig, client: Client) -> Option<Self> {
        let token = config.bot_token()?;
        Some(Self {
            api: BotApi::new(client.clone(), &config.telegram_api_base, token),
            client,
            confirm_url: config.confirm_url(),
            poll_timeout: config.poll_timeout,
            retry_interval: config.poll_retry,
            idle_interval: config.poll_idle,
            offset: 0,
        })
    }

    /// Next `update_id` to request.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Run until `stop` flips to `true` (or its sender is dropped).
    pub async fn run(mut self, mut stop: watch::Receiver<bool>) {
        tracing::info!(confirm_url = self.confirm_url.as_str(), "Telegram poller starting");

        if let Err(e) = self.api.delete_webhook().await {
            tracing::warn!(error = %e, "deleteWebhook failed, continuing");
        }

        loop {
            if *stop.borrow() {
                break;
            }

            // A stop cancels the fetch only; fetched updates are always
            // dispatched in full.
            let fetched = tokio::select! {
                fetched = self.api.get_updates(self.offset, self.poll_timeout) => fetched,
                _ = stop.changed() => break,
            };

            let pause = match fetched {
                Ok(updates) => {
                    self.dispatch(&updates).await;
                    self.idle_interval
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        offset = self.offset,
                        retry_secs = self.retry_interval.as_secs(),
                        "getUpdates failed, retrying"
                    );
                    self.retry_interval
                }
            };

            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = stop.changed() => break,
            }
        }

        tracing::info!(offset = self.offset, "Telegram poller stopped");
    }

    /// One fetch-and-dispatch round. Returns the number of updates received.
    ///
    /// The offset moves past every received update, including ones that
    /// are ignored, so nothing is delivered twice. On error it stays put.
    pub async fn poll_once(&mut self) -> Result<usize, TelegramError> {
        let updates = self.api.get_updates(self.offset, self.poll_timeout).await?;
        self.dispatch(&updates).await;
        Ok(updates.len())
    }

    async fn dispatch(&mut self, updates: &[Update]) {
        for update in updates {
            self.offset = self.offset.max(update.update_id + 1);
            if let Some((token, telegram_id)) = Self::binding_request(update) {
                self.confirm(token, telegram_id).await;
            }
        }
    }

    /// The `(token, telegram_id)` pair carried by an update, if any.
    fn binding_request(update: &Update) -> Option<(&str, i64)> {
        let message = update.message.as_ref()?;
        let from = message.from.as_ref()?;
        let token = parse_start_command(message.text.as_deref()?)?;

        tracing::info!(
            update_id = update.update_id,
            message_id = message.message_id,
            telegram_id = from.id,
            username = from.username.as_deref().unwrap_or(""),
            token = token_preview(token).as_str(),
            "Received /start with binding token"
        );
        Some((token, from.id))
    }

    /// Post a confirmation. Failures are logged only.
    async fn confirm(&self, token: &str, telegram_id: i64) {
        let payload = ConfirmPayload {
            token,
            telegram_id: telegram_id.to_string(),
        };

        let response = match self.client.post(&self.confirm_url).json(&payload).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::error!(
                    url = self.confirm_url.as_str(),
                    error = %e,
                    "Confirm request failed"
                );
                return;
            }
        };

        let status = response.status();
        if status.is_success() {
            tracing::info!(telegram_id, "Binding confirmed");
        } else {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                status = status.as_u16(),
                body = body.as_str(),
                token = token_preview(token).as_str(),
                "Confirm rejected"
            );
        }
    }
}
