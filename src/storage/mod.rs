//! `SQLite` projection store and shared SQL infrastructure.
//!
//! - [`connection`]: connection handling (`Mutex<Connection>`, lock
//!   acquisition with poison recovery, pragma configuration)
//! - [`sql`]: SQL helper functions (LIKE escaping, list/JSON and embedding
//!   BLOB codecs)
//! - [`store`]: the [`SqliteStore`] projection queries and mark writes
//!
//! Backends fail independently and degrade gracefully; `SQLite` WAL mode
//! keeps concurrency acceptable even with a single serialized connection.

pub mod connection;
pub mod sql;
mod store;

pub use connection::{acquire_lock, configure_connection};
pub use sql::{escape_like_wildcards, strings_to_json};
pub use store::SqliteStore;
