//! Error types for the persistence layer.

use castle_protocol::GameId;

/// Errors that can occur while reading or writing games.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected a statement or could not be opened.
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// An update targeted a game row that does not exist.
    #[error("no game row for {0}")]
    MissingGame(GameId),

    /// A stored value could not be decoded.
    #[error("corrupt value in column {column}: {value:?}")]
    Corrupt { column: &'static str, value: String },

    /// The backend refused the write. Used by [`MemoryStore`](crate::MemoryStore)
    /// when told to fail.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
