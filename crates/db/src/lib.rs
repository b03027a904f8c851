//! SQLite persistence handle shared by bookshelf modules.
//!
//! A [`Database`] owns a single connection. Every call runs on tokio's blocking
//! pool and holds the connection lock for its whole duration, so statements
//! issued through one handle never interleave.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;

mod migrations;

pub use migrations::Migration;

/// Path understood as "no file, keep everything in memory".
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Cloneable handle to the application database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("handles", &Arc::strong_count(&self.conn))
            .finish()
    }
}

impl Database {
    /// Open (or create) the database at `url`.
    pub fn open(url: &str, busy_timeout: Duration) -> Result<Self, DbError> {
        let conn = if url == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(url)?
        };
        conn.busy_timeout(busy_timeout)?;

        tracing::info!(target: "bookshelf-db", url, "database opened");
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DbError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// A panic inside `f` surfaces as [`DbError::Join`]; later calls take over
    /// the poisoned lock and keep using the connection.
    pub async fn call<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut *guard).map_err(DbError::from)
        })
        .await?
    }

    /// Close the connection.
    ///
    /// If other clones of the handle are still alive the connection stays open
    /// until the last one is dropped.
    pub fn close(self) -> Result<(), DbError> {
        match Arc::try_unwrap(self.conn) {
            Ok(mutex) => {
                let conn = mutex.into_inner().unwrap_or_else(PoisonError::into_inner);
                conn.close().map_err(|(_, err)| DbError::Sqlite(err))?;
                tracing::info!(target: "bookshelf-db", "database closed");
                Ok(())
            }
            Err(shared) => {
                tracing::warn!(
                    target: "bookshelf-db",
                    handles = Arc::strong_count(&shared),
                    "database still shared at close; deferring to last handle"
                );
                Ok(())
            }
        }
    }
}
