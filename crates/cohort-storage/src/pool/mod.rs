//! Connection pool managing read/write connections.

pub mod pragmas;
pub mod read_pool;
pub mod write_connection;

use std::path::{Path, PathBuf};

use cohort_core::config::StorageConfig;
use cohort_core::errors::CohortResult;

pub use read_pool::ReadPool;
pub use write_connection::WriteConnection;

/// Manages the single write connection and the read connection pool.
pub struct ConnectionPool {
    pub writer: WriteConnection,
    /// `None` for in-memory databases, where every read goes through the writer.
    pub readers: Option<ReadPool>,
    pub db_path: Option<PathBuf>,
}

impl ConnectionPool {
    /// Open a connection pool for the given database file.
    pub fn open(path: &Path, config: &StorageConfig) -> CohortResult<Self> {
        // The writer goes first so the file and WAL exist before readers attach.
        let writer = WriteConnection::open(path, config.busy_timeout_ms, config.wal_mode)?;
        let readers = ReadPool::open(path, config.read_pool_size, config.busy_timeout_ms)?;
        Ok(Self {
            writer,
            readers: Some(readers),
            db_path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory pool (for testing). A second in-memory connection
    /// would be a separate database, so there are no readers.
    pub fn open_in_memory() -> CohortResult<Self> {
        let config = StorageConfig::default();
        let writer = WriteConnection::open_in_memory(config.busy_timeout_ms)?;
        Ok(Self {
            writer,
            readers: None,
            db_path: None,
        })
    }

    /// Run `f` on a reader, or on the writer when there is no read pool.
    pub fn with_reader<F, T>(&self, f: F) -> CohortResult<T>
    where
        F: FnOnce(&rusqlite::Connection) -> CohortResult<T>,
    {
        match &self.readers {
            Some(readers) => readers.with_conn(f),
            None => self.writer.with_conn_sync(f),
        }
    }
}
