//! Account repository.
//!
//! The binding handshake only needs three things from the account store:
//! whether an account exists, and reading/writing its Telegram ID. These
//! are expressed as the [`AccountRepository`] trait so the handshake can run
//! against any backing store. [`SqliteAccountRepository`] is the bundled
//! implementation (file-backed, or in-memory when no path is configured).

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{BindError, Result};

const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    email       TEXT    NOT NULL UNIQUE,
    telegram_id TEXT    NOT NULL DEFAULT '',
    created_at  INTEGER NOT NULL
);
"#;

/// What the handshake needs from the account store.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Whether an account with this ID exists.
    async fn account_exists(&self, account_id: i64) -> Result<bool>;

    /// Record the Telegram ID for an account, replacing any previous one.
    async fn set_telegram_id(&self, account_id: i64, telegram_id: &str) -> Result<()>;

    /// The Telegram ID recorded for an account (empty if unbound).
    async fn telegram_id(&self, account_id: i64) -> Result<Option<String>>;
}

/// SQLite-backed account repository.
#[derive(Clone)]
pub struct SqliteAccountRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAccountRepository {
    /// Open or create the database.
    ///
    /// If path is None, creates an in-memory database.
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        conn.execute_batch(CREATE_TABLES)?;

        tracing::info!(path = path.unwrap_or(":memory:"), "Account database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an account if the email is new; return the account ID either way.
    pub fn ensure_account(&self, email: &str) -> Result<i64> {
        let email = email.trim().to_lowercase();
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO users (email, created_at) VALUES (?1, ?2)",
            params![email, chrono::Utc::now().timestamp()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM users WHERE email = ?1",
            params![email],
            |row| row.get(0),
        )?;
        Ok(id)
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn account_exists(&self, account_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM users WHERE id = ?1",
                params![account_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn set_telegram_id(&self, account_id: i64, telegram_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE users SET telegram_id = ?1 WHERE id = ?2",
            params![telegram_id.trim(), account_id],
        )?;
        if updated == 0 {
            return Err(BindError::Database(format!(
                "account {} not found",
                account_id
            )));
        }
        Ok(())
    }

    async fn telegram_id(&self, account_id: i64) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let id: Option<String> = conn
            .query_row(
                "SELECT telegram_id FROM users WHERE id = ?1",
                params![account_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id.filter(|t| !t.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_bind_account() {
        let repo = SqliteAccountRepository::open(None).unwrap();
        let id = repo.ensure_account("Alice@Example.com").unwrap();

        assert!(repo.account_exists(id).await.unwrap());
        assert_eq!(repo.telegram_id(id).await.unwrap(), None);

        repo.set_telegram_id(id, " 424242 ").await.unwrap();
        assert_eq!(repo.telegram_id(id).await.unwrap().as_deref(), Some("424242"));
    }

    #[tokio::test]
    async fn test_rebinding_overwrites() {
        let repo = SqliteAccountRepository::open(None).unwrap();
        let id = repo.ensure_account("bob@example.com").unwrap();

        repo.set_telegram_id(id, "1").await.unwrap();
        repo.set_telegram_id(id, "2").await.unwrap();
        assert_eq!(repo.telegram_id(id).await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let repo = SqliteAccountRepository::open(None).unwrap();
        assert!(!repo.account_exists(99).await.unwrap());
        assert!(repo.set_telegram_id(99, "1").await.is_err());
        assert_eq!(repo.telegram_id(99).await.unwrap(), None);
    }

    #[test]
    fn test_ensure_account_is_idempotent() {
        let repo = SqliteAccountRepository::open(None).unwrap();
        let first = repo.ensure_account("dup@example.com").unwrap();
        let second = repo.ensure_account(" DUP@example.com").unwrap();
        assert_eq!(first, second);

        let other = repo.ensure_account("other@example.com").unwrap();
        assert_ne!(first, other);
    }
}
