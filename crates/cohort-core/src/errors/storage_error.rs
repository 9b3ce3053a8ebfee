/// Persistence-boundary errors. Transient from the caller's point of view.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("lock poisoned: {what}")]
    LockPoisoned { what: String },

    #[error("serialization failed: {message}")]
    Serialization { message: String },
}
