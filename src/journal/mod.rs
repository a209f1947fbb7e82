//! Durable write-through journal over SQLite (§4.2, §10.4).
//!
//! `rusqlite` is synchronous, so every query is dispatched through
//! `tokio::task::spawn_blocking`; the orchestrator only ever awaits the
//! returned future. The connection is opened once in WAL mode with foreign
//! keys enforced and shared behind a `std::sync::Mutex` — reads are
//! read-mostly (dashboard, startup reconciliation) and writes come from the
//! single-threaded control loop, so contention is not a concern.

mod repositories;
mod schema;

pub use repositories::{GridLevelRow, OrderRow, SnapshotRecord};

use crate::errors::JournalError;
use std::sync::{Arc, Mutex};

pub struct Journal {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl Journal {
    pub async fn open(db_path: &str) -> Result<Self, JournalError> {
        let path = db_path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<rusqlite::Connection, rusqlite::Error> {
            let conn = rusqlite::Connection::open(&path)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "foreign_keys", "ON")?;
            schema::run_migrations(&conn)?;
            Ok(conn)
        })
        .await??;
        log::info!("journal_opened db_path={db_path}");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn close(&self) -> Result<(), JournalError> {
        log::info!("journal_closed");
        Ok(())
    }

    /// Runs a blocking closure against the shared connection on the
    /// blocking-pool thread. All repository methods funnel through this.
    async fn with_conn<F, T>(&self, f: F) -> Result<T, JournalError>
    where
        F: FnOnce(&rusqlite::Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("journal connection mutex poisoned");
            f(&guard)
        })
        .await?
        .map_err(JournalError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_runs_migrations_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gridbot.db");
        let path_str = path.to_str().unwrap();
        let journal = Journal::open(path_str).await.unwrap();
        journal.close().await.unwrap();
        // Re-opening the same file must not fail even though tables exist.
        let journal2 = Journal::open(path_str).await.unwrap();
        journal2.close().await.unwrap();
    }
}
