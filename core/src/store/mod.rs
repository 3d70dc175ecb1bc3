//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Pipeline stages call store methods; they never execute SQL directly.

use crate::{error::EtlResult, types::RowId};
use rusqlite::{Connection, Params};
use std::path::Path;

mod dimension;
mod job;
mod schema;
mod staging;
mod transaction;

pub use dimension::{DimensionIndex, DimensionRow};
pub use schema::Migration;

pub struct EtlStore {
    conn: Connection,
}

impl EtlStore {
    pub fn open(path: &str) -> EtlResult<Self> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !path.starts_with("file:") {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> EtlResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply the embedded schema migrations in order.
    pub fn migrate(&self) -> EtlResult<usize> {
        self.apply_migrations(&Migration::embedded())
    }

    /// Apply the embedded migrations, then any `*.sql` found in `dir`.
    pub fn migrate_with_dir(&self, dir: &Path) -> EtlResult<usize> {
        let mut migrations = Migration::embedded();
        migrations.extend(Migration::discover(dir)?);
        self.apply_migrations(&migrations)
    }

    // ── Raw statement surface ──────────────────────────────────

    pub fn execute<P: Params>(&self, sql: &str, params: P) -> EtlResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    pub fn execute_batch(&self, sql: &str) -> EtlResult<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    pub fn insert_returning_id<P: Params>(&self, sql: &str, params: P) -> EtlResult<RowId> {
        self.conn.execute(sql, params)?;
        Ok(self.conn.last_insert_rowid())
    }

    // ── Transaction scope ──────────────────────────────────────

    /// Run `f` inside one database transaction.
    ///
    /// Commits when `f` returns `Ok`. On `Err` the transaction is rolled
    /// back before the error is returned; on unwind the guard's drop
    /// rolls it back.
    pub fn in_transaction<T>(&self, f: impl FnOnce(&Self) -> EtlResult<T>) -> EtlResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        match f(self) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::error!("Rollback failed after '{e}': {rollback_err}");
                }
                Err(e)
            }
        }
    }
}
