//! Change token persistence
//!
//! Exactly one opaque token is kept per key. Reads never fail: storage that
//! cannot be read reports "no token", which makes the next fetch a full
//! resync instead of an error.

use std::sync::Mutex;

use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::models::ChangeToken;
use crate::util::unix_millis_now;

/// Fixed key the change token is stored under
pub const DEFAULT_TOKEN_KEY: &str = "change_token";

/// Storage for the single "last synchronized position" cursor
pub trait ChangeTokenStore {
    /// Load the stored token, `None` when absent or unreadable
    fn load(&self) -> Option<ChangeToken>;

    /// Replace the stored token; `None` clears it
    fn save(&self, token: Option<&ChangeToken>) -> Result<()>;
}

/// `SQLite` implementation of `ChangeTokenStore`
pub struct SqliteChangeTokenStore {
    db: Mutex<Database>,
    key: String,
}

impl SqliteChangeTokenStore {
    /// Create a store under [`DEFAULT_TOKEN_KEY`]
    pub fn new(db: Database) -> Self {
        Self::with_key(db, DEFAULT_TOKEN_KEY)
    }

    /// Create a store under a custom key
    pub fn with_key(db: Database, key: impl Into<String>) -> Self {
        Self {
            db: Mutex::new(db),
            key: key.into(),
        }
    }

    /// Create a store under the configured [`EngineConfig::token_key`]
    pub fn for_config(db: Database, config: &EngineConfig) -> Self {
        Self::with_key(db, config.token_key.clone())
    }

    fn try_load(&self) -> Result<Option<ChangeToken>> {
        let db = self
            .db
            .lock()
            .map_err(|_| Error::Persistence("token store lock poisoned".to_string()))?;
        let value: Option<Vec<u8>> = db
            .connection()
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?",
                params![self.key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.map(ChangeToken::from_bytes))
    }

    fn try_save(&self, token: Option<&ChangeToken>) -> Result<()> {
        let db = self
            .db
            .lock()
            .map_err(|_| Error::Persistence("token store lock poisoned".to_string()))?;
        match token {
            Some(token) => {
                db.connection().execute(
                    "INSERT OR REPLACE INTO sync_state (key, value, updated_at) VALUES (?, ?, ?)",
                    params![self.key, token.as_bytes(), unix_millis_now()],
                )?;
            }
            None => {
                db.connection()
                    .execute("DELETE FROM sync_state WHERE key = ?", params![self.key])?;
            }
        }
        Ok(())
    }
}

impl ChangeTokenStore for SqliteChangeTokenStore {
    fn load(&self) -> Option<ChangeToken> {
        match self.try_load() {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(
                    "Change token unreadable ({error}); next fetch will resync from scratch"
                );
                None
            }
        }
    }

    fn save(&self, token: Option<&ChangeToken>) -> Result<()> {
        self.try_save(token).map_err(|error| match error {
            Error::Persistence(_) => error,
            other => Error::Persistence(other.to_string()),
        })
    }
}

/// In-memory implementation of `ChangeTokenStore`
#[derive(Debug, Default)]
pub struct MemoryChangeTokenStore {
    token: Mutex<Option<ChangeToken>>,
}

impl MemoryChangeTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeTokenStore for MemoryChangeTokenStore {
    fn load(&self) -> Option<ChangeToken> {
        self.token.lock().ok().and_then(|token| token.clone())
    }

    fn save(&self, token: Option<&ChangeToken>) -> Result<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| Error::Persistence("token store lock poisoned".to_string()))?;
        *slot = token.cloned();
        Ok(())
    }
}

impl<T: ChangeTokenStore + ?Sized> ChangeTokenStore for std::sync::Arc<T> {
    fn load(&self) -> Option<ChangeToken> {
        (**self).load()
    }

    fn save(&self, token: Option<&ChangeToken>) -> Result<()> {
        (**self).save(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_absent_token() {
        let store = SqliteChangeTokenStore::new(Database::open_in_memory().unwrap());
        assert!(store.load().is_none());
    }

    #[test]
    fn test_save_and_load_token() {
        let store = SqliteChangeTokenStore::new(Database::open_in_memory().unwrap());
        let token = ChangeToken::from_bytes(vec![0, 159, 146, 150]);

        store.save(Some(&token)).unwrap();
        assert_eq!(store.load(), Some(token.clone()));

        // Idempotent
        store.save(Some(&token)).unwrap();
        assert_eq!(store.load(), Some(token));
    }

    #[test]
    fn test_save_none_clears_token() {
        let store = SqliteChangeTokenStore::new(Database::open_in_memory().unwrap());
        store
            .save(Some(&ChangeToken::from_bytes(b"42".to_vec())))
            .unwrap();

        store.save(None).unwrap();
        assert!(store.load().is_none());
        store.save(None).unwrap();
    }

    #[test]
    fn test_token_survives_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("hazard.db");
        let token = ChangeToken::from_bytes(b"17".to_vec());

        {
            let store = SqliteChangeTokenStore::new(Database::open(&db_path).unwrap());
            store.save(Some(&token)).unwrap();
        }

        let reopened = SqliteChangeTokenStore::new(Database::open(&db_path).unwrap());
        assert_eq!(reopened.load(), Some(token));
    }

    #[test]
    fn test_config_selects_token_key() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("hazard.db");
        let tablet = EngineConfig {
            token_key: "tablet".to_string(),
            ..EngineConfig::default()
        };
        let token = ChangeToken::from_bytes(b"9".to_vec());

        SqliteChangeTokenStore::for_config(Database::open(&db_path).unwrap(), &tablet)
            .save(Some(&token))
            .unwrap();

        let default_store = SqliteChangeTokenStore::for_config(
            Database::open(&db_path).unwrap(),
            &EngineConfig::default(),
        );
        assert!(default_store.load().is_none());
        let reopened =
            SqliteChangeTokenStore::with_key(Database::open(&db_path).unwrap(), "tablet");
        assert_eq!(reopened.load(), Some(token));
    }

    #[test]
    fn test_keys_are_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("hazard.db");

        let first = SqliteChangeTokenStore::with_key(Database::open(&db_path).unwrap(), "a");
        let second = SqliteChangeTokenStore::with_key(Database::open(&db_path).unwrap(), "b");
        first
            .save(Some(&ChangeToken::from_bytes(b"1".to_vec())))
            .unwrap();

        assert!(second.load().is_none());
    }

    #[test]
    fn test_unreadable_storage_loads_as_absent() {
        let db = Database::open_in_memory().unwrap();
        db.connection().execute_batch("DROP TABLE sync_state").unwrap();
        let store = SqliteChangeTokenStore::new(db);

        assert!(store.load().is_none());
        let error = store
            .save(Some(&ChangeToken::from_bytes(b"1".to_vec())))
            .unwrap_err();
        assert!(matches!(error, Error::Persistence(_)));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryChangeTokenStore::new();
        assert!(store.load().is_none());
        let token = ChangeToken::from_bytes(b"3".to_vec());
        store.save(Some(&token)).unwrap();
        assert_eq!(store.load(), Some(token));
        store.save(None).unwrap();
        assert!(store.load().is_none());
    }
}
