//! Local persistence for the Matosinhos water temperature monitor.
//!
//! This crate provides a small SQLite-backed key-value table that survives
//! restarts. The monitor keeps its last reading and its settings here.
//!
//! # Example
//!
//! ```no_run
//! use matoswim_store::Store;
//!
//! let store = Store::open(matoswim_store::default_db_path())?;
//! store.set("temperatureThreshold", "18.5")?;
//! assert_eq!(store.get("temperatureThreshold")?.as_deref(), Some("18.5"));
//! # Ok::<(), matoswim_store::Error>(())
//! ```

mod error;
mod schema;
mod store;

pub use error::{Error, Result};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/matoswim/data.db`
/// - macOS: `~/Library/Application Support/matoswim/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\matoswim\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("matoswim")
        .join("data.db")
}
