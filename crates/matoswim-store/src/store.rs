//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::schema;

/// SQLite-backed key-value store.
pub struct Store {
    conn: Connection,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Write a value, replacing any previous one.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Write several values in one transaction.
    ///
    /// Either every entry is stored or, on error, none is.
    pub fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    updated_at = excluded.updated_at",
            )?;
            for (key, value) in entries {
                stmt.execute(rusqlite::params![key, value, now])?;
            }
        }
        tx.commit()?;
        debug!("Stored {} value(s)", entries.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_missing_key() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get("lastWaterTemperature").unwrap(), None);
    }

    #[test]
    fn test_set_and_overwrite() {
        let store = Store::open_in_memory().unwrap();
        store.set("temperatureThreshold", "18.0").unwrap();
        store.set("temperatureThreshold", "19.5").unwrap();

        assert_eq!(
            store.get("temperatureThreshold").unwrap().as_deref(),
            Some("19.5")
        );
    }

    #[test]
    fn test_set_many() {
        let store = Store::open_in_memory().unwrap();
        store.set("lastWaterTemperature", "17.0").unwrap();
        store
            .set_many(&[
                ("lastUpdatedTime", "14:03:22"),
                ("lastWaterTemperature", "18.5"),
            ])
            .unwrap();

        assert_eq!(
            store.get("lastWaterTemperature").unwrap().as_deref(),
            Some("18.5")
        );
        assert_eq!(
            store.get("lastUpdatedTime").unwrap().as_deref(),
            Some("14:03:22")
        );
    }

    #[test]
    fn test_failed_batch_is_rolled_back() {
        let store = Store::open_in_memory().unwrap();
        store.set("lastWaterTemperature", "17.0").unwrap();
        store
            .conn
            .execute_batch(
                "CREATE TRIGGER reject_timestamp BEFORE INSERT ON preferences
                 WHEN NEW.key = 'lastUpdatedAt'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = store.set_many(&[
            ("lastWaterTemperature", "19.0"),
            ("lastUpdatedAt", "2024-07-26T14:00:00Z"),
        ]);
        assert!(result.is_err());
        assert_eq!(
            store.get("lastWaterTemperature").unwrap().as_deref(),
            Some("17.0")
        );
        assert_eq!(store.get("lastUpdatedAt").unwrap(), None);
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        {
            let store = Store::open(&path).unwrap();
            store.set("lastWaterTemperature", "17.6").unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(
            store.get("lastWaterTemperature").unwrap().as_deref(),
            Some("17.6")
        );
    }
}
