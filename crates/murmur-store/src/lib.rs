//! Durable message storage for Murmur rooms.
//!
//! Every room owns one `messages` table. The room actor keeps the history
//! in memory and writes every change through to its store; the store is
//! read exactly once, when the room is activated.
//!
//! # Key types
//!
//! - [`MessageStore`] - what a room needs from storage
//! - [`SqliteStore`] - the SQLite implementation (one database per room)
//! - [`StoreLocation`] - where room databases live
//! - [`COLUMN_MIGRATIONS`] - the versioned, additive schema history

#![allow(async_fn_in_trait)]

mod error;
mod migrations;
mod sqlite;

use std::future::Future;
use std::path::PathBuf;

use murmur_protocol::Message;

pub use error::StoreError;
pub use migrations::{
    BASE_COLUMNS, COLUMN_MIGRATIONS, ColumnMigration, TABLE, latest_version,
};
pub use sqlite::SqliteStore;

/// Storage operations a room performs on its message table.
///
/// The room actor is the only caller, one operation at a time, so
/// implementations take `&mut self` and need no internal locking.
pub trait MessageStore: Send + 'static {
    /// Ensures the table exists and every column migration is applied.
    ///
    /// Must be idempotent: running it on an up-to-date schema changes
    /// nothing.
    fn migrate(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Loads the full history, oldest first.
    ///
    /// Rows are ordered by `created_at`; a table that predates that column
    /// is read in insertion order instead.
    fn load_messages(
        &mut self,
    ) -> impl Future<Output = Result<Vec<Message>, StoreError>> + Send;

    /// Inserts `message`, or updates the stored row with the same id.
    fn upsert_message(
        &mut self,
        message: &Message,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Where room databases are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StoreLocation {
    /// Each room gets a private in-memory database, lost on shutdown.
    #[default]
    InMemory,

    /// Each room gets `<dir>/<room>.sqlite3`, created on first use.
    Directory(PathBuf),
}
