//! SQLite backend for the staffroom identity store.
//!
//! The connection is owned by a single thread (the kiosk engine), so
//! access is synchronous `rusqlite` without a pool.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
