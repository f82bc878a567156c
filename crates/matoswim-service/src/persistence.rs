//! [`KeyValueStore`] backed by the SQLite store.

use std::sync::{Mutex, PoisonError};

use matoswim_core::{KeyValueStore, PersistenceError};
use matoswim_store::Store;

/// Adapter that lets the tracker persist into a [`Store`].
#[derive(Debug)]
pub struct SqliteKeyValueStore {
    store: Mutex<Store>,
}

impl SqliteKeyValueStore {
    /// Wrap an open store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}

fn unavailable(e: matoswim_store::Error) -> PersistenceError {
    PersistenceError::Unavailable(e.to_string())
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_err(unavailable)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set(key, value)
            .map_err(unavailable)
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<(), PersistenceError> {
        self.store
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_many(entries)
            .map_err(unavailable)
    }
}
