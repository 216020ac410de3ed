//! Binding handshake service.
//!
//! Ties the token store, the account repository and the bot identity
//! resolver together behind the operations exposed over HTTP.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::BindingStore;
use super::token_preview;
use crate::accounts::AccountRepository;
use crate::config::TELEGRAM_LINK_BASE;
use crate::error::{BindError, Result};
use crate::telegram::BotIdentityResolver;

/// Result of `start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartResponse {
    pub token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bot_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
}

/// Result of `status` for a live token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub bound: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<String>,
}

/// The three outcomes a status query can have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindStatus {
    /// Unknown or expired token.
    NotFound,
    /// Live token, not yet confirmed.
    Pending,
    /// Confirmed with this Telegram ID.
    Bound(String),
}

/// Body of a confirm call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
    pub telegram_id: String,
}

/// Binding summary of an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccountBinding {
    pub user_id: i64,
    pub email: String,
    pub telegram_bound: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub telegram_id: Option<String>,
}

/// Orchestrates start / status / confirm.
#[derive(Clone)]
pub struct HandshakeService {
    store: Arc<dyn BindingStore>,
    accounts: Arc<dyn AccountRepository>,
    resolver: Arc<BotIdentityResolver>,
    ttl: Duration,
}

impl HandshakeService {
    pub fn new(
        store: Arc<dyn BindingStore>,
        accounts: Arc<dyn AccountRepository>,
        resolver: Arc<BotIdentityResolver>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            accounts,
            resolver,
            ttl,
        }
    }

    /// Issue a binding token for an authenticated account.
    ///
    /// A missing bot handle only drops the convenience link; the token is
    /// still returned.
    pub async fn start(&self, account_id: i64) -> Result<StartResponse> {
        if !self.accounts.account_exists(account_id).await? {
            tracing::warn!(account_id, "Bind start for unknown account");
            return Err(BindError::Unauthorized);
        }

        let token = self.store.issue(account_id, self.ttl).await?;
        let bot_name = self.resolver.resolve().await;
        let start_url = bot_name
            .as_deref()
            .map(|bot| format!("{}/{}?start={}", TELEGRAM_LINK_BASE, bot, token));

        tracing::info!(
            account_id,
            token = token_preview(&token).as_str(),
            link = start_url.is_some(),
            "Binding token issued"
        );

        Ok(StartResponse {
            token,
            expires_in: self.ttl.as_secs(),
            bot_name,
            start_url,
        })
    }

    /// Report whether a token has been confirmed. The token is the only
    /// credential here.
    pub async fn status(&self, token: &str) -> Result<BindStatus> {
        let token = token.trim();
        if token.is_empty() {
            return Err(BindError::TokenRequired);
        }

        match self.store.lookup(token).await {
            Ok(record) => Ok(match record.telegram_id {
                Some(id) => BindStatus::Bound(id),
                None => BindStatus::Pending,
            }),
            Err(BindError::NotFound) => Ok(BindStatus::NotFound),
            Err(e) => Err(e),
        }
    }

    /// Confirm a token on behalf of the bot and persist the Telegram ID.
    ///
    /// If persisting fails the token stays confirmed in the store; a later
    /// confirm with the same token retries the write.
    pub async fn confirm(&self, request: &ConfirmRequest) -> Result<()> {
        let token = request.token.trim();
        let telegram_id = request.telegram_id.trim();
        if token.is_empty() || telegram_id.is_empty() {
            return Err(BindError::InvalidRequest);
        }

        let owner = match self.store.confirm(token, telegram_id).await {
            Ok(owner) => owner,
            Err(BindError::NotFound) => {
                tracing::info!(
                    token = token_preview(token).as_str(),
                    "Confirm for unknown or expired token"
                );
                return Err(BindError::NotFound);
            }
            Err(e) => return Err(e),
        };

        self.accounts
            .set_telegram_id(owner, telegram_id)
            .await
            .map_err(|e| {
                tracing::error!(
                    account_id = owner,
                    telegram_id,
                    error = %e,
                    "Token confirmed but account update failed"
                );
                BindError::AccountUpdate(e.to_string())
            })?;

        tracing::info!(account_id = owner, telegram_id, "Telegram account bound");
        Ok(())
    }

    /// The bot handle, if it can be resolved.
    pub async fn bot_name(&self) -> Option<String> {
        self.resolver.resolve().await
    }

    /// Binding summary for an authenticated account.
    pub async fn account_binding(&self, account_id: i64, email: &str) -> Result<AccountBinding> {
        if !self.accounts.account_exists(account_id).await? {
            return Err(BindError::Unauthorized);
        }
        let telegram_id = self.accounts.telegram_id(account_id).await?;
        Ok(AccountBinding {
            user_id: account_id,
            email: email.to_string(),
            telegram_bound: telegram_id.is_some(),
            telegram_id,
        })
    }
}
