//! SQLite-backed [`MessageStore`].

use std::collections::HashSet;
use std::str::FromStr;

use murmur_protocol::{Message, Role, RoomId};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::Row;

use crate::migrations::{COLUMN_MIGRATIONS, CREATE_TABLE, TABLE, latest_version};
use crate::{MessageStore, StoreError, StoreLocation};

/// Optional columns read back into a [`Message`], in select order.
const OPTIONAL_COLUMNS: [&str; 4] =
    ["created_at", "user_ip", "user_device", "user_account"];

/// A room's message table in its own SQLite database.
///
/// The pool holds a single connection: a room is driven by one actor, and
/// an in-memory database only lives as long as its connection.
///
/// The set of existing columns is cached after [`migrate`] and
/// [`load_messages`] so writes can target exactly the columns the schema
/// has without asking SQLite every time.
///
/// [`migrate`]: MessageStore::migrate
/// [`load_messages`]: MessageStore::load_messages
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    columns: HashSet<String>,
}

impl SqliteStore {
    /// Opens the database for `room` at `location`.
    ///
    /// Does not touch the schema; call [`MessageStore::migrate`] next.
    pub async fn open(
        location: &StoreLocation,
        room: &RoomId,
    ) -> Result<Self, StoreError> {
        let options = match location {
            StoreLocation::InMemory => {
                SqliteConnectOptions::from_str("sqlite::memory:")?
            }
            StoreLocation::Directory(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                SqliteConnectOptions::new()
                    .filename(dir.join(format!("{room}.sqlite3")))
                    .create_if_missing(true)
                    .journal_mode(SqliteJournalMode::Wal)
            }
        };
        tracing::debug!(room_id = %room, ?location, "opening room store");
        Self::connect_with(options).await
    }

    /// Opens a store over arbitrary connection options.
    pub async fn connect_with(
        options: SqliteConnectOptions,
    ) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            columns: HashSet::new(),
        })
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reads the current column names of the `messages` table.
    /// Empty if the table does not exist yet.
    pub async fn table_columns(&self) -> Result<HashSet<String>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT name FROM pragma_table_info('{TABLE}')"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().collect())
    }

    /// Returns `true` if `column` exists, asking SQLite directly.
    pub async fn column_exists(&self, column: &str) -> Result<bool, StoreError> {
        Ok(self.table_columns().await?.contains(column))
    }

    /// Adds `column` unless it already exists.
    ///
    /// Returns `true` if the column was added.
    pub async fn add_column_if_missing(
        &mut self,
        column: &str,
        sql_type: &str,
    ) -> Result<bool, StoreError> {
        if self.column_exists(column).await? {
            self.columns.insert(column.to_owned());
            return Ok(false);
        }
        self.add_column(column, sql_type).await
    }

    /// Runs `ALTER TABLE ... ADD COLUMN` without checking first.
    ///
    /// Returns `true` if the column was added. Losing a race against
    /// another migrator ("duplicate column") counts as already present.
    pub async fn add_column(&mut self, column: &str, sql_type: &str) -> Result<bool, StoreError> {
        let alter = format!("ALTER TABLE {TABLE} ADD COLUMN {column} {sql_type}");
        match sqlx::query(&alter).execute(&self.pool).await {
            Ok(_) => {
                tracing::info!(column, sql_type, "added column");
                self.columns.insert(column.to_owned());
                Ok(true)
            }
            Err(e) if is_duplicate_column(&e) => {
                tracing::debug!(column, "column added concurrently, skipping");
                self.columns.insert(column.to_owned());
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The schema version recorded by the last completed migration.
    pub async fn schema_version(&self) -> Result<u32, StoreError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(u32::try_from(version).unwrap_or(0))
    }

    /// Returns `true` if the cached schema has `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    async fn refresh_columns(&mut self) -> Result<(), StoreError> {
        self.columns = self.table_columns().await?;
        Ok(())
    }
}

impl MessageStore for SqliteStore {
    async fn migrate(&mut self) -> Result<(), StoreError> {
        sqlx::query(CREATE_TABLE).execute(&self.pool).await?;
        self.refresh_columns().await?;

        for migration in COLUMN_MIGRATIONS {
            self.add_column_if_missing(migration.column, migration.sql_type)
                .await?;
        }

        let recorded = self.schema_version().await?;
        let latest = latest_version();
        if recorded < latest {
            // PRAGMA values cannot be bound; `latest` is a plain integer.
            sqlx::query(&format!("PRAGMA user_version = {latest}"))
                .execute(&self.pool)
                .await?;
            tracing::info!(from = recorded, to = latest, "schema migrated");
        }
        Ok(())
    }

    async fn load_messages(&mut self) -> Result<Vec<Message>, StoreError> {
        self.refresh_columns().await?;

        let optional = OPTIONAL_COLUMNS
            .iter()
            .map(|c| {
                if self.has_column(c) {
                    (*c).to_owned()
                } else {
                    format!("NULL AS {c}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        let order = if self.has_column("created_at") {
            "created_at ASC, rowid ASC"
        } else {
            tracing::warn!("created_at column missing, loading in insertion order");
            "rowid ASC"
        };

        let sql = format!(
            "SELECT id, user, role, content, {optional} FROM {TABLE} ORDER BY {order}"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn upsert_message(&mut self, message: &Message) -> Result<(), StoreError> {
        if self.columns.is_empty() {
            self.refresh_columns().await?;
        }

        let mut columns = vec!["id", "user", "role", "content"];
        let mut values: Vec<Option<&str>> = vec![
            Some(message.id.as_str()),
            Some(message.user.as_str()),
            Some(message.role.as_str()),
            Some(message.content.as_str()),
        ];
        let optional = [
            ("created_at", message.created_at.as_deref()),
            ("user_ip", message.user_ip.as_deref()),
            ("user_device", message.user_device.as_deref()),
            ("user_account", message.user_account.as_deref()),
        ];
        for (column, value) in optional {
            if self.has_column(column) {
                columns.push(column);
                values.push(value);
            }
        }

        let mut updates = vec!["content = excluded.content"];
        if self.has_column("created_at") {
            updates.push("created_at = excluded.created_at");
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {TABLE} ({}) VALUES ({placeholders}) \
             ON CONFLICT (id) DO UPDATE SET {}",
            columns.join(", "),
            updates.join(", "),
        );

        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }
        query.execute(&self.pool).await?;
        Ok(())
    }
}

/// SQLite reports a racing `ADD COLUMN` only through its message text;
/// there is no dedicated error code for it.
pub(crate) fn is_duplicate_column(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.message().contains("duplicate column"),
        _ => false,
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message, StoreError> {
    let id: String = row.try_get("id")?;
    let role: Option<String> = row.try_get("role")?;
    let role = match role.as_deref().map(Role::from_str) {
        Some(Ok(role)) => role,
        _ => {
            return Err(StoreError::InvalidRow {
                id,
                reason: format!("unknown role {role:?}"),
            });
        }
    };

    Ok(Message {
        content: optional_text(row, "content")?.unwrap_or_default(),
        user: optional_text(row, "user")?.unwrap_or_default(),
        role,
        created_at: optional_text(row, "created_at")?,
        user_ip: optional_text(row, "user_ip")?,
        user_device: optional_text(row, "user_device")?,
        user_account: optional_text(row, "user_account")?,
        id,
    })
}

/// Reads a nullable text column. Older writers stored `''` for absent
/// metadata, so empty strings read back as `None`.
fn optional_text(row: &SqliteRow, column: &str) -> Result<Option<String>, StoreError> {
    let value: Option<String> = row.try_get(column)?;
    Ok(value.filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::open(&StoreLocation::InMemory, &RoomId::parse("t").unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_column_error_is_recognised() {
        let store = memory_store().await;
        sqlx::query(CREATE_TABLE).execute(store.pool()).await.unwrap();
        sqlx::query("ALTER TABLE messages ADD COLUMN extra TEXT")
            .execute(store.pool())
            .await
            .unwrap();

        let err = sqlx::query("ALTER TABLE messages ADD COLUMN extra TEXT")
            .execute(store.pool())
            .await
            .unwrap_err();
        assert!(is_duplicate_column(&err));
    }

    #[tokio::test]
    async fn test_other_errors_are_not_duplicate_column() {
        let store = memory_store().await;
        let err = sqlx::query("SELECT * FROM missing_table")
            .fetch_all(store.pool())
            .await
            .err()
            .unwrap();
        assert!(!is_duplicate_column(&err));
        assert!(!is_duplicate_column(&sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn test_table_columns_empty_before_create() {
        let store = memory_store().await;
        assert!(store.table_columns().await.unwrap().is_empty());
    }
}
