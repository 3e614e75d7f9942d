//! Session persistence and per-session locking.
//!
//! `SessionStore` serializes turns of one session id behind an async mutex
//! with a bounded wait; `SessionRepository` implementations hold the
//! documents between turns.

pub mod repository;
pub mod store;

pub use repository::{InMemoryRepository, SessionDocument, SessionRepository, SqliteRepository};
pub use store::{SessionHandle, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Session document could not be (de)serialized: {0}")]
    Serialization(String),

    #[error("Session {session_id} is busy (waited {waited_ms} ms)")]
    LockTimeout { session_id: String, waited_ms: u128 },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Session storage error: {0}")]
    Storage(String),
}
