//! Error types for the storage layer.

/// Errors that can occur while migrating, loading, or writing a room's
/// message table.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a statement or the connection failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The directory holding room databases could not be created.
    #[error("store directory unavailable: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row does not map onto a [`Message`](murmur_protocol::Message).
    #[error("invalid row {id:?}: {reason}")]
    InvalidRow { id: String, reason: String },
}
