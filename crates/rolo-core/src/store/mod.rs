//! Client-resident persistent store.
//!
//! One SQLite table of namespaced keys, each holding a JSON array (or scalar
//! flag): the local mirror of every collection the sync layer reconciles.
//! The store is the sole writer of its own collections; components receive a
//! `&Store` rather than reaching into ambient state.
//!
//! Read failures and malformed JSON degrade to an empty collection with a
//! warning, so a corrupt store starts empty instead of crashing the session.

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Company, Contact, MergeRecord, SyncQueueItem};
use crate::util::now_ms;

/// Namespaced storage keys
pub mod keys {
    /// Canonical-schema contact collection
    pub const CONTACTS: &str = "contacts.v2";
    /// Older-schema contact mirror kept for legacy readers
    pub const CONTACTS_LEGACY: &str = "contacts.v1";
    /// Canonical-schema company collection
    pub const COMPANIES: &str = "companies.v2";
    /// Older-schema company mirror
    pub const COMPANIES_LEGACY: &str = "companies.v1";
    /// Durable mutation queue
    pub const SYNC_QUEUE: &str = "sync.queue";
    /// Merge-history log
    pub const MERGE_HISTORY: &str = "merge.history";

    /// Per-user identity-migration completion flag
    #[must_use]
    pub fn migration_flag(user_id: &str) -> String {
        format!("migrations.identity.{user_id}")
    }
}

/// Local key/value store backed by `SQLite`
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             CREATE TABLE IF NOT EXISTS kv (
                 key TEXT PRIMARY KEY,
                 value TEXT NOT NULL,
                 updated_at INTEGER NOT NULL
             );",
        )?;
        Ok(())
    }

    fn get_raw(&self, key: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?", params![key], |row| {
                row.get(0)
            })
            .optional()
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?, ?, ?)",
            params![key, value, now_ms()],
        )?;
        Ok(())
    }

    /// Load a collection, degrading to empty on any read or parse failure
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Vec<T> {
        let raw = match self.get_raw(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(error) => {
                tracing::warn!(key, %error, "store read failed, treating as empty");
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(items) => items,
            Err(error) => {
                tracing::warn!(key, %error, "malformed persisted JSON, treating as empty");
                Vec::new()
            }
        }
    }

    /// Persist a collection under its namespaced key
    pub fn save<T: Serialize>(&self, key: &str, items: &[T]) -> Result<()> {
        let raw = serde_json::to_string(items)?;
        self.put_raw(key, &raw)
    }

    /// Read a completion flag; the value is the Unix-ms timestamp it was set
    pub fn flag(&self, key: &str) -> Option<i64> {
        match self.get_raw(key) {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(error) => {
                tracing::warn!(key, %error, "flag read failed, treating as unset");
                None
            }
        }
    }

    /// Set a completion flag, stamped with the current time
    pub fn set_flag(&self, key: &str) -> Result<()> {
        self.put_raw(key, &now_ms().to_string())
    }

    // Typed collection accessors

    pub fn contacts(&self) -> Vec<Contact> {
        self.load(keys::CONTACTS)
    }

    pub fn save_contacts(&self, contacts: &[Contact]) -> Result<()> {
        self.save(keys::CONTACTS, contacts)
    }

    pub fn companies(&self) -> Vec<Company> {
        self.load(keys::COMPANIES)
    }

    pub fn save_companies(&self, companies: &[Company]) -> Result<()> {
        self.save(keys::COMPANIES, companies)
    }

    pub fn sync_queue(&self) -> Vec<SyncQueueItem> {
        self.load(keys::SYNC_QUEUE)
    }

    pub fn save_sync_queue(&self, items: &[SyncQueueItem]) -> Result<()> {
        self.save(keys::SYNC_QUEUE, items)
    }

    pub fn merge_history(&self) -> Vec<MergeRecord> {
        self.load(keys::MERGE_HISTORY)
    }

    pub fn save_merge_history(&self, records: &[MergeRecord]) -> Result<()> {
        self.save(keys::MERGE_HISTORY, records)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn load_missing_key_is_empty() {
        let store = Store::open_in_memory().unwrap();
        let contacts = store.contacts();
        assert!(contacts.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let contacts = vec![Contact::new("Ada"), Contact::new("Grace")];
        store.save_contacts(&contacts).unwrap();
        assert_eq!(store.contacts(), contacts);
    }

    #[test]
    fn malformed_json_degrades_to_empty() {
        let store = Store::open_in_memory().unwrap();
        store.put_raw(keys::CONTACTS, "{not json").unwrap();
        assert!(store.contacts().is_empty());
    }

    #[test]
    fn flags_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let key = keys::migration_flag("user-1");
        assert!(store.flag(&key).is_none());

        store.set_flag(&key).unwrap();
        assert!(store.flag(&key).is_some());
        assert!(store.flag(&keys::migration_flag("user-2")).is_none());
    }

    #[test]
    fn open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rolo.db");
        {
            let store = Store::open(&path).unwrap();
            store.save_contacts(&[Contact::new("Ada")]).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.contacts().len(), 1);
    }
}
