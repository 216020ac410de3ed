//! Telegram account binding.
//!
//! Links a logged-in account to a Telegram user through a short-lived
//! token handshake:
//!
//! 1. The web client calls `start` and gets a token plus a
//!    `https://t.me/<bot>?start=<token>` link.
//! 2. The user opens the link; Telegram sends `/start <token>` to the bot.
//! 3. The update poller sees the message and calls `confirm` with the
//!    sender's Telegram ID. The ID is written to the owning account.
//! 4. Meanwhile the web client polls `status` until it reports `bound`.
//!
//! Tokens live for five minutes and are held in a [`BindingStore`].

pub mod api;
pub mod service;
pub mod store;

pub use service::HandshakeService;
pub use store::{BindingStore, MemoryBindingStore};

/// Shortened form of a token for log lines.
pub fn token_preview(token: &str) -> String {
    if token.chars().count() > 8 {
        let head: String = token.chars().take(8).collect();
        format!("{}...", head)
    } else {
        token.to_string()
    }
}
