//! User Storage
//! Mission: Securely store and manage user accounts with SQLite

use crate::auth::models::User;
use anyhow::{bail, Context, Result};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                password_hash TEXT NOT NULL,
                subscribed_symbols TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create a new account. Fails if the email is already registered.
    pub fn create_user(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let conn = Connection::open(&self.db_path)?;

        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .context("Failed to check for existing user")?;
        if exists > 0 {
            bail!("Email already exists");
        }

        let password_hash = hash(password, DEFAULT_COST).context("Failed to hash password")?;
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            subscribed_symbols: Vec::new(),
            created_at: Utc::now().to_rfc3339(),
        };

        conn.execute(
            "INSERT INTO users (id, email, name, password_hash, subscribed_symbols, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.to_string(),
                user.email,
                user.name,
                user.password_hash,
                serde_json::to_string(&user.subscribed_symbols)?,
                user.created_at,
            ],
        )
        .context("Failed to insert user")?;

        Ok(user)
    }

    /// Check email/password and return the user on a match.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_email(email)? else {
            return Ok(None);
        };
        let valid = verify(password, &user.password_hash).unwrap_or(false);
        Ok(valid.then_some(user))
    }

    /// Get user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, email, name, password_hash, subscribed_symbols, created_at
             FROM users WHERE email = ?1",
        )?;
        let user = stmt
            .query_row(params![email], Self::row_to_user)
            .optional()?;
        Ok(user)
    }

    /// Get user by id
    pub fn get_user_by_id(&self, user_id: &str) -> Result<Option<User>> {
        let conn = Connection::open(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, email, name, password_hash, subscribed_symbols, created_at
             FROM users WHERE id = ?1",
        )?;
        let user = stmt
            .query_row(params![user_id], Self::row_to_user)
            .optional()?;
        Ok(user)
    }

    /// Add a symbol to a user's persisted subscription list. Idempotent.
    pub fn add_subscription(&self, user_id: &str, symbol: &str) -> Result<Vec<String>> {
        let Some(mut user) = self.get_user_by_id(user_id)? else {
            bail!("User {} not found", user_id);
        };
        if !user.subscribed_symbols.iter().any(|s| s == symbol) {
            user.subscribed_symbols.push(symbol.to_string());
            self.store_subscriptions(user_id, &user.subscribed_symbols)?;
        }
        Ok(user.subscribed_symbols)
    }

    /// Remove a symbol from a user's persisted subscription list. Idempotent.
    pub fn remove_subscription(&self, user_id: &str, symbol: &str) -> Result<Vec<String>> {
        let Some(mut user) = self.get_user_by_id(user_id)? else {
            bail!("User {} not found", user_id);
        };
        user.subscribed_symbols.retain(|s| s != symbol);
        self.store_subscriptions(user_id, &user.subscribed_symbols)?;
        Ok(user.subscribed_symbols)
    }

    fn store_subscriptions(&self, user_id: &str, symbols: &[String]) -> Result<()> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "UPDATE users SET subscribed_symbols = ?1 WHERE id = ?2",
            params![serde_json::to_string(symbols)?, user_id],
        )
        .context("Failed to update subscriptions")?;
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
        let id_str: String = row.get(0)?;
        let symbols_json: String = row.get(4)?;
        Ok(User {
            id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
            email: row.get(1)?,
            name: row.get(2)?,
            password_hash: row.get(3)?,
            subscribed_symbols: serde_json::from_str(&symbols_json).unwrap_or_default(),
            created_at: row.get(5)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, UserStore) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test_users.db");
        let store = UserStore::new(path.to_str().unwrap()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_signup_and_credential_check() {
        let (_dir, store) = test_store();
        let user = store
            .create_user("trader@example.com", "hunter22", "Trader")
            .unwrap();
        assert_ne!(user.password_hash, "hunter22"); // stored hashed

        let ok = store
            .verify_credentials("trader@example.com", "hunter22")
            .unwrap();
        assert_eq!(ok.unwrap().id, user.id);

        let bad = store
            .verify_credentials("trader@example.com", "wrong")
            .unwrap();
        assert!(bad.is_none());
        let unknown = store.verify_credentials("ghost@example.com", "x").unwrap();
        assert!(unknown.is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (_dir, store) = test_store();
        store.create_user("a@example.com", "pw", "A").unwrap();
        assert!(store.create_user("a@example.com", "pw2", "B").is_err());
    }

    #[test]
    fn test_subscription_list_roundtrip() {
        let (_dir, store) = test_store();
        let user = store.create_user("a@example.com", "pw", "A").unwrap();
        let id = user.id.to_string();

        let subs = store.add_subscription(&id, "GOOG").unwrap();
        assert_eq!(subs, vec!["GOOG"]);
        // Adding twice keeps a single entry.
        let subs = store.add_subscription(&id, "GOOG").unwrap();
        assert_eq!(subs, vec!["GOOG"]);
        let subs = store.add_subscription(&id, "TSLA").unwrap();
        assert_eq!(subs, vec!["GOOG", "TSLA"]);

        let subs = store.remove_subscription(&id, "GOOG").unwrap();
        assert_eq!(subs, vec!["TSLA"]);
        let subs = store.remove_subscription(&id, "GOOG").unwrap();
        assert_eq!(subs, vec!["TSLA"]);
    }
}
