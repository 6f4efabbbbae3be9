//! Schema of the `messages` table and its additive migrations.
//!
//! The table starts with four columns. Everything added later is an
//! optional column appended by a [`ColumnMigration`]; migrations never drop
//! or rewrite data, so a room created by any earlier release opens
//! unchanged and just gains the missing columns.
//!
//! To add a column: append an entry with the next version number.

/// The table every room stores its history in.
pub const TABLE: &str = "messages";

/// Creates the table with the columns every schema version has.
pub(crate) const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    user TEXT,
    role TEXT,
    content TEXT
)";

/// Columns present since the first schema version.
pub const BASE_COLUMNS: [&str; 4] = ["id", "user", "role", "content"];

/// One optional column added to the `messages` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMigration {
    /// Schema version reached once this column exists.
    pub version: u32,
    /// Column name.
    pub column: &'static str,
    /// SQLite column type.
    pub sql_type: &'static str,
}

/// Every additive migration, in the order they are applied.
pub const COLUMN_MIGRATIONS: &[ColumnMigration] = &[
    ColumnMigration { version: 1, column: "created_at", sql_type: "TEXT" },
    ColumnMigration { version: 2, column: "user_ip", sql_type: "TEXT" },
    ColumnMigration { version: 3, column: "user_device", sql_type: "TEXT" },
    ColumnMigration { version: 4, column: "user_account", sql_type: "TEXT" },
];

/// The schema version after every migration has been applied.
pub fn latest_version() -> u32 {
    COLUMN_MIGRATIONS
        .iter()
        .map(|m| m.version)
        .max()
        .unwrap_or(0)
}
