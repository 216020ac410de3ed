//! Bot identity resolver.
//!
//! The bot's public handle is needed to build `https://t.me/<bot>?start=..`
//! links. A statically configured handle wins; otherwise the handle is
//! fetched once through `getMe` and cached for the life of the process.
//! Failed lookups are not cached, so the next call tries again.

use tokio::sync::Mutex;

use super::client::BotApi;

pub struct BotIdentityResolver {
    configured: Option<String>,
    api: Option<BotApi>,
    cached: Mutex<Option<String>>,
}

impl BotIdentityResolver {
    /// `configured` takes precedence; `api` is only consulted without it.
    pub fn new(configured: Option<String>, api: Option<BotApi>) -> Self {
        let configured = configured
            .map(|n| n.trim().trim_start_matches('@').to_string())
            .filter(|n| !n.is_empty());
        Self {
            configured,
            api,
            cached: Mutex::new(None),
        }
    }

    /// The bot handle, or `None` if it cannot be determined right now.
    pub async fn resolve(&self) -> Option<String> {
        if let Some(ref name) = self.configured {
            return Some(name.clone());
        }
        let api = self.api.as_ref()?;

        // Held across the lookup so concurrent callers share one request.
        let mut cached = self.cached.lock().await;
        if let Some(ref name) = *cached {
            return Some(name.clone());
        }

        match api.get_me().await {
            Ok(bot) => match bot.username.filter(|u| !u.is_empty()) {
                Some(username) => {
                    tracing::info!(bot = username.as_str(), "Resolved bot handle via getMe");
                    *cached = Some(username.clone());
                    Some(username)
                }
                None => {
                    tracing::warn!("getMe returned no username");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve bot handle");
                None
            }
        }
    }
}
