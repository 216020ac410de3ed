//! Binding token store.
//!
//! Maps opaque binding tokens to the account that requested them and, once
//! the bot has seen the token, the Telegram ID that claimed it.
//!
//! [`BindingStore`] is the contract the handshake depends on.
//! [`MemoryBindingStore`] keeps records in a process-local map, which only
//! works while a single instance serves both the web client and the bot
//! poller. Running several instances means swapping in an implementation
//! backed by a shared TTL-capable key-value store; the trait stays the same.
//!
//! ## Expiry
//!
//! A record is visible while `now < expires_at`. There is no timer: every
//! operation first sweeps expired records out of the map, under the same
//! lock as the operation itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::{BindError, Result};

/// Random bytes per token (hex-encoded to 32 characters).
pub const TOKEN_BYTES: usize = 16;

/// A pending or confirmed binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRecord {
    /// Account that started the binding. Never changes.
    pub owner_account_id: i64,
    /// Set by `confirm`; `None` while pending.
    pub telegram_id: Option<String>,
    /// Fixed at issue time, never extended.
    pub expires_at: DateTime<Utc>,
}

impl BindingRecord {
    pub fn is_bound(&self) -> bool {
        self.telegram_id.is_some()
    }
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Storage for binding tokens.
///
/// Lookups and confirms report [`BindError::NotFound`] both for tokens that
/// were never issued and for expired ones.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Create a record for `owner_account_id` expiring after `ttl` and
    /// return its token.
    async fn issue(&self, owner_account_id: i64, ttl: Duration) -> Result<String>;

    /// Fetch a live record.
    async fn lookup(&self, token: &str) -> Result<BindingRecord>;

    /// Attach a Telegram ID to a live record and return its owner.
    ///
    /// Confirming an already-confirmed token overwrites the previous ID.
    async fn confirm(&self, token: &str, telegram_id: &str) -> Result<i64>;
}

/// Generate a fresh binding token from the OS entropy source.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| BindError::Entropy(e.to_string()))?;
    Ok(hex::encode(bytes))
}

/// In-process binding store.
///
/// One mutex guards the whole map; sweep and operation happen under a
/// single acquisition, so all operations are linearized.
#[derive(Clone)]
pub struct MemoryBindingStore {
    records: Arc<Mutex<HashMap<String, BindingRecord>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryBindingStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            clock,
        }
    }

    /// Remove every record with `expires_at <= now`. Caller holds the lock.
    fn sweep(records: &mut HashMap<String, BindingRecord>, now: DateTime<Utc>) {
        let before = records.len();
        records.retain(|_, r| now < r.expires_at);
        let swept = before - records.len();
        if swept > 0 {
            tracing::debug!(swept, remaining = records.len(), "Swept expired binding tokens");
        }
    }
}

impl Default for MemoryBindingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BindingStore for MemoryBindingStore {
    async fn issue(&self, owner_account_id: i64, ttl: Duration) -> Result<String> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| BindError::Lifetime(format!("{:?}: {}", ttl, e)))?;

        let mut records = self.records.lock();
        let now = self.clock.now();
        Self::sweep(&mut records, now);
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| BindError::Lifetime(format!("{} + {} overflows", now, ttl)))?;

        let token = loop {
            let candidate = generate_token()?;
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };

        records.insert(
            token.clone(),
            BindingRecord {
                owner_account_id,
                telegram_id: None,
                expires_at,
            },
        );

        Ok(token)
    }

    async fn lookup(&self, token: &str) -> Result<BindingRecord> {
        let mut records = self.records.lock();
        Self::sweep(&mut records, self.clock.now());
        records.get(token).cloned().ok_or(BindError::NotFound)
    }

    async fn confirm(&self, token: &str, telegram_id: &str) -> Result<i64> {
        let mut records = self.records.lock();
        Self::sweep(&mut records, self.clock.now());

        let record = records.get_mut(token).ok_or(BindError::NotFound)?;
        if let Some(previous) = record.telegram_id.as_deref() {
            if previous != telegram_id {
                tracing::warn!(
                    owner = record.owner_account_id,
                    previous,
                    telegram_id,
                    "Binding token re-confirmed with a different Telegram ID"
                );
            }
        }
        record.telegram_id = Some(telegram_id.to_string());
        Ok(record.owner_account_id)
    }
}

/// Settable clock for expiry tests.
#[cfg(test)]
pub struct ManualClock(Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self(Mutex::new(Utc::now()))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.0.lock();
        *now += chrono::Duration::milliseconds(by.as_millis() as i64);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    const TTL: Duration = Duration::from_secs(300);

    fn store_with_clock() -> (MemoryBindingStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (MemoryBindingStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_token_format() {
        let token = generate_token().unwrap();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let store = MemoryBindingStore::new();

        let result = store.issue(1, Duration::from_secs(1_000_000_000_000_000)).await;
        assert!(matches!(result, Err(BindError::Lifetime(_))));

        let result = store.issue(1, Duration::from_secs(u64::MAX)).await;
        assert!(matches!(result, Err(BindError::Lifetime(_))));

        // The store is still usable afterwards.
        let token = store.issue(1, TTL).await.unwrap();
        assert!(store.lookup(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_lookup_within_ttl() {
        let store = MemoryBindingStore::new();
        let token = store.issue(7, TTL).await.unwrap();

        let record = store.lookup(&token).await.unwrap();
        assert_eq!(record.owner_account_id, 7);
        assert_eq!(record.telegram_id, None);
        assert!(!record.is_bound());
    }

    #[tokio::test]
    async fn test_lookup_unknown_token() {
        let store = MemoryBindingStore::new();
        assert!(matches!(
            store.lookup("deadbeef").await,
            Err(BindError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (store, clock) = store_with_clock();
        let token = store.issue(1, TTL).await.unwrap();

        clock.advance(Duration::from_secs(299));
        let record = store.lookup(&token).await.unwrap();
        assert!(!record.is_bound());

        // Visible strictly before expires_at only.
        clock.advance(Duration::from_secs(1));
        assert!(matches!(store.lookup(&token).await, Err(BindError::NotFound)));
    }

    #[tokio::test]
    async fn test_status_scenario_without_confirm() {
        let (store, clock) = store_with_clock();
        let token = store.issue(1, TTL).await.unwrap();

        clock.advance(Duration::from_secs(4 * 60 + 59));
        assert!(!store.lookup(&token).await.unwrap().is_bound());

        clock.advance(Duration::from_secs(2));
        assert!(matches!(store.lookup(&token).await, Err(BindError::NotFound)));
    }

    #[tokio::test]
    async fn test_expired_records_are_swept_on_access() {
        let (store, clock) = store_with_clock();
        store.issue(1, TTL).await.unwrap();
        store.issue(2, TTL).await.unwrap();
        assert_eq!(store.records.lock().len(), 2);

        clock.advance(TTL);
        let fresh = store.issue(3, TTL).await.unwrap();

        let records = store.records.lock();
        assert_eq!(records.len(), 1);
        assert!(records.contains_key(&fresh));
    }

    #[tokio::test]
    async fn test_confirm_then_lookup() {
        let store = MemoryBindingStore::new();
        let token = store.issue(9, TTL).await.unwrap();

        let owner = store.confirm(&token, "424242").await.unwrap();
        assert_eq!(owner, 9);

        let record = store.lookup(&token).await.unwrap();
        assert!(record.is_bound());
        assert_eq!(record.telegram_id.as_deref(), Some("424242"));
        assert_eq!(record.owner_account_id, 9);
    }

    #[tokio::test]
    async fn test_confirm_unknown_or_expired() {
        let (store, clock) = store_with_clock();
        assert!(matches!(
            store.confirm("nope", "1").await,
            Err(BindError::NotFound)
        ));

        let token = store.issue(1, TTL).await.unwrap();
        clock.advance(TTL + Duration::from_secs(1));
        assert!(matches!(
            store.confirm(&token, "1").await,
            Err(BindError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_reconfirm_overwrites() {
        let store = MemoryBindingStore::new();
        let token = store.issue(4, TTL).await.unwrap();

        store.confirm(&token, "111").await.unwrap();
        store.confirm(&token, "222").await.unwrap();

        let record = store.lookup(&token).await.unwrap();
        assert_eq!(record.telegram_id.as_deref(), Some("222"));
        assert_eq!(record.owner_account_id, 4);
    }

    #[tokio::test]
    async fn test_confirm_does_not_extend_expiry() {
        let (store, clock) = store_with_clock();
        let token = store.issue(1, TTL).await.unwrap();
        let issued = store.lookup(&token).await.unwrap().expires_at;

        clock.advance(Duration::from_secs(60));
        store.confirm(&token, "5").await.unwrap();
        assert_eq!(store.lookup(&token).await.unwrap().expires_at, issued);
    }

    #[tokio::test]
    async fn test_multiple_outstanding_tokens_per_account() {
        let store = MemoryBindingStore::new();
        let first = store.issue(1, TTL).await.unwrap();
        let second = store.issue(1, TTL).await.unwrap();
        assert_ne!(first, second);

        store.confirm(&second, "77").await.unwrap();
        assert!(!store.lookup(&first).await.unwrap().is_bound());
        assert!(store.lookup(&second).await.unwrap().is_bound());
    }

    #[tokio::test]
    async fn test_ten_thousand_tokens_are_distinct() {
        let store = MemoryBindingStore::new();
        let mut seen = HashSet::new();
        for i in 0..10_000 {
            let token = store.issue(i, TTL).await.unwrap();
            assert!(seen.insert(token));
        }
        assert_eq!(store.records.lock().len(), 10_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_issue_yields_distinct_tokens() {
        let store = MemoryBindingStore::new();
        let mut handles = Vec::new();
        for i in 0..64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.issue(i, TTL).await.unwrap() }));
        }

        let mut tokens = HashSet::new();
        for handle in handles {
            tokens.insert(handle.await.unwrap());
        }
        assert_eq!(tokens.len(), 64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_confirms_leave_one_winner() {
        let store = MemoryBindingStore::new();
        let token = store.issue(12, TTL).await.unwrap();

        let ids: Vec<String> = (0..16).map(|i| format!("{}", 1000 + i)).collect();
        let mut handles = Vec::new();
        for id in ids.clone() {
            let store = store.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { store.confirm(&token, &id).await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 12);
        }

        let record = store.lookup(&token).await.unwrap();
        assert_eq!(record.owner_account_id, 12);
        let winner = record.telegram_id.unwrap();
        assert!(ids.contains(&winner));
    }
}
