//! Storage layer for adgate
//!
//! Counters and timestamps are persisted through a minimal integer key/value
//! contract. SQLite backs the CLI and on-device state; the in-memory store
//! backs tests and embedders that bring their own durability.

use crate::error::Result;

pub mod memory;
pub mod migrations;
pub mod persistence;
pub mod sqlite;

pub use memory::MemoryStore;
pub use persistence::Persistence;
pub use sqlite::SqliteStore;

/// Durable integer key/value contract.
///
/// Implementations may fail; callers above [`Persistence`] never see those
/// failures because the engine treats durability as best-effort.
pub trait KeyValueStore: Send + Sync {
    fn get_int(&self, key: &str, default: i32) -> Result<i32>;
    fn put_int(&self, key: &str, value: i32) -> Result<()>;
    fn get_long(&self, key: &str, default: i64) -> Result<i64>;
    fn put_long(&self, key: &str, value: i64) -> Result<()>;
}
