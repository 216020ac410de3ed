//! Shared server state.
//!
//! Cloned into every handler. Everything mutable lives behind the handshake
//! service's store and repository handles.

use std::sync::Arc;

use crate::accounts::AccountRepository;
use crate::binding::{HandshakeService, MemoryBindingStore};
use crate::config::ServerConfig;
use crate::telegram::{BotApi, BotIdentityResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub binding: HandshakeService,
}

impl AppState {
    /// Wire up the binding subsystem with the in-process token store.
    pub fn new(
        config: ServerConfig,
        accounts: Arc<dyn AccountRepository>,
        http: reqwest::Client,
    ) -> Self {
        let api = config
            .bot_token()
            .map(|token| BotApi::new(http, &config.telegram_api_base, token));
        let resolver = BotIdentityResolver::new(config.bot_name().map(String::from), api);

        let binding = HandshakeService::new(
            Arc::new(MemoryBindingStore::new()),
            accounts,
            Arc::new(resolver),
            config.bind_ttl,
        );

        Self {
            config: Arc::new(config),
            binding,
        }
    }
}
