//! SQLite persistence for the alcofleet backend.
//!
//! This crate stores the device directory, user accounts, the append-only
//! telemetry history, and the per-device latest-state snapshot used by the
//! ingestion engine to make acceptance decisions without scanning history.
//!
//! # Example
//!
//! ```no_run
//! use alcofleet_store::{Store, RecordQuery};
//!
//! let store = Store::open_default()?;
//!
//! // Query recent records for a device
//! let query = RecordQuery::new().device(42).limit(10);
//! let records = store.query_records(&query)?;
//! # Ok::<(), alcofleet_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{LatestState, NewDevice, StoredDevice, StoredRecord, StoredUser};
pub use queries::{DevicePage, DeviceQuery, RecordQuery};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/alcofleet/data.db`
/// - macOS: `~/Library/Application Support/alcofleet/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\alcofleet\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("alcofleet")
        .join("data.db")
}
