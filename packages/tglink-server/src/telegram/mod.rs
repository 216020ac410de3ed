//! Telegram side of the binding handshake.
//!
//! - [`client`]: thin Bot API client (`getMe`, `getUpdates`, `deleteWebhook`)
//! - [`resolver`]: bot handle lookup with process-lifetime cache
//! - [`poller`]: long-polling loop that turns `/start <token>` into confirms

pub mod client;
pub mod poller;
pub mod resolver;
pub mod types;

pub use client::BotApi;
pub use poller::UpdatePoller;
pub use resolver::BotIdentityResolver;
