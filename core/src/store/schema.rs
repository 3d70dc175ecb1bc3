//! Schema initializer.
//!
//! Migrations are applied in the order given and recorded in
//! `schema_migration`. A version already recorded is skipped, so
//! calling `migrate()` on every start is safe.

use super::EtlStore;
use crate::{error::EtlResult, types::timestamp_now};
use rusqlite::{params, OptionalExtension};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: String,
    pub sql: String,
}

impl Migration {
    pub fn new(version: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            sql: sql.into(),
        }
    }

    /// Migrations compiled into the binary.
    pub fn embedded() -> Vec<Migration> {
        vec![
            Migration::new(
                "001_job",
                include_str!("../../../migrations/001_job.sql"),
            ),
            Migration::new(
                "002_dimensions",
                include_str!("../../../migrations/002_dimensions.sql"),
            ),
            Migration::new(
                "003_transactions",
                include_str!("../../../migrations/003_transactions.sql"),
            ),
        ]
    }

    /// Every `*.sql` file in `dir`, ordered by file name.
    /// The version is the file stem.
    pub fn discover(dir: &Path) -> EtlResult<Vec<Migration>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sql") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut migrations = Vec::with_capacity(paths.len());
        for path in paths {
            let version = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let sql = std::fs::read_to_string(&path)?;
            migrations.push(Migration::new(version, sql));
        }
        Ok(migrations)
    }
}

impl EtlStore {
    /// Apply every migration not yet recorded. Returns how many ran.
    pub fn apply_migrations(&self, migrations: &[Migration]) -> EtlResult<usize> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migration (
                version    TEXT PRIMARY KEY NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )?;

        let mut applied = 0;
        for migration in migrations {
            if self.is_migration_applied(&migration.version)? {
                continue;
            }
            self.in_transaction(|store| {
                store.conn.execute_batch(&migration.sql)?;
                store.conn.execute(
                    "INSERT INTO schema_migration (version, applied_at) VALUES (?1, ?2)",
                    params![migration.version, timestamp_now()],
                )?;
                Ok(())
            })?;
            log::info!("Applied migration {}", migration.version);
            applied += 1;
        }
        Ok(applied)
    }

    pub fn is_migration_applied(&self, version: &str) -> EtlResult<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM schema_migration WHERE version = ?1",
                params![version],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn applied_migrations(&self) -> EtlResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migration ORDER BY version ASC")?;
        let versions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(versions)
    }
}
