//! Persist Core Library
//!
//! An embedded key-value store that keeps each key as its own JSON file,
//! readable and editable by hand, with an in-memory cache in front and a
//! deferred, coalesced write path behind.
//!
//! # Quick Start
//!
//! ```text
//! let store = Store::open("/path/to/data", true)?;
//!
//! store.set("user", json!({"name": "Ann"})).await?;
//! store.set_path("user", "prefs.theme", json!("dark")).await?;
//!
//! let theme = store.get_path("user", "prefs.theme", json!("light")).await;
//! ```
//!
//! # Modules
//!
//! - `store`: the `Store` (main entry point)
//! - `codec`: key to filename mapping
//! - `path`: dotted-path access into JSON values
//! - `flush`: write queue draining
//! - `storage`: record files, cache and write queue, errors
//! - `config`: store configuration

pub mod codec;
pub mod config;
mod flush;
pub mod path;
pub mod storage;
pub mod store;

pub use config::Config;
pub use path::PathError;
pub use storage::{StorageStats, StoreError, StoreResult};
pub use store::Store;
