//! SQLite backend for the roster personnel store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The same backend serves the server's
//! authoritative store and each client's local mirror.

mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteStore, expand_home};
