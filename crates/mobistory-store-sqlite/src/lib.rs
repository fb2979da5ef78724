//! SQLite backend for the Mobistory ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Multi-row invariants (link transition
//! + history + projected event, source write + event, name update + pointer
//! repoint) are committed inside explicit transactions.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
