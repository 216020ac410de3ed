//! Minimal Telegram Bot API client.
//!
//! Wraps the three methods the binding flow needs: `getMe`, `getUpdates`
//! and `deleteWebhook`.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use super::types::{BotResponse, Update, User};
use crate::error::TelegramError;

/// Slack added on top of the long-poll window before the HTTP request
/// itself is abandoned.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Bot API client bound to one bot token.
#[derive(Clone)]
pub struct BotApi {
    client: Client,
    api_base: String,
    token: String,
}

impl BotApi {
    pub fn new(client: Client, api_base: &str, token: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim().trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Fetch the bot's own user record.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        let response = self.client.get(self.method_url("getMe")).send().await?;
        Self::decode(response).await
    }

    /// Long-poll for updates with `update_id >= offset`.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, TelegramError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", timeout.as_secs().to_string()),
            ])
            .timeout(timeout + LONG_POLL_GRACE)
            .send()
            .await?;
        Self::decode(response).await
    }

    /// Drop any registered webhook; `getUpdates` receives nothing while one
    /// is set.
    pub async fn delete_webhook(&self) -> Result<bool, TelegramError> {
        let response = self
            .client
            .get(self.method_url("deleteWebhook"))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TelegramError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(TelegramError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BotResponse<T> =
            serde_json::from_str(&body).map_err(|e| TelegramError::Malformed(e.to_string()))?;
        if !parsed.ok {
            return Err(TelegramError::Rejected(
                parsed.description.unwrap_or_default(),
            ));
        }
        parsed
            .result
            .ok_or_else(|| TelegramError::Malformed("missing result".to_string()))
    }
}
